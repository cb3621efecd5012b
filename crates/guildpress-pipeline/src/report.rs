use std::collections::BTreeMap;

use serde::Serialize;

use guildpress_ai::UsageTotals;
use guildpress_core::types::Stage;

use crate::PipelineContext;

/// One failed batch. The stage keeps going; the failure is enumerated
/// here instead of poisoning the run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub batch_index: usize,
    pub error: String,
    pub ids: Vec<String>,
}

/// Aggregate outcome of one stage invocation.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub dry_run: bool,
    /// Entities selected for processing.
    pub candidates: usize,
    pub batches: usize,
    /// Entities with a result persisted by this run.
    pub processed: usize,
    pub kept: usize,
    pub discarded: usize,
    pub topics: BTreeMap<String, usize>,
    pub sentiments: BTreeMap<String, usize>,
    pub relevance: BTreeMap<String, usize>,
    pub extracts_by_type: BTreeMap<String, usize>,
    pub summaries_written: usize,
    pub errors: Vec<BatchFailure>,
    /// Run-wide usage at the time this stage finished.
    pub usage: UsageTotals,
    pub estimated_cost_usd: f64,
}

impl StageReport {
    pub(crate) fn new(stage: Stage, dry_run: bool) -> Self {
        Self {
            stage,
            dry_run,
            candidates: 0,
            batches: 0,
            processed: 0,
            kept: 0,
            discarded: 0,
            topics: BTreeMap::new(),
            sentiments: BTreeMap::new(),
            relevance: BTreeMap::new(),
            extracts_by_type: BTreeMap::new(),
            summaries_written: 0,
            errors: Vec::new(),
            usage: UsageTotals::default(),
            estimated_cost_usd: 0.0,
        }
    }

    pub(crate) fn finish(mut self, ctx: &PipelineContext) -> Self {
        self.usage = ctx.usage.totals();
        self.estimated_cost_usd = ctx.usage.estimate_cost(
            ctx.settings.input_cost_per_1k,
            ctx.settings.output_cost_per_1k,
        );
        self
    }

    pub(crate) fn fail_batch(&mut self, batch_index: usize, error: impl ToString, ids: Vec<String>) {
        self.errors.push(BatchFailure {
            batch_index,
            error: error.to_string(),
            ids,
        });
    }
}
