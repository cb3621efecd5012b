use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// Accumulated token spend across LLM calls.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Shared usage accounting for one pipeline run. Safe to record into
/// from concurrent batch workers.
#[derive(Default)]
pub struct UsageTracker {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    totals: UsageTotals,
    by_model: HashMap<String, UsageTotals>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, model: &str, tokens_in: u32, tokens_out: u32) {
        fn bump(totals: &mut UsageTotals, tokens_in: u32, tokens_out: u32) {
            totals.calls += 1;
            totals.tokens_in += u64::from(tokens_in);
            totals.tokens_out += u64::from(tokens_out);
        }

        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        bump(&mut inner.totals, tokens_in, tokens_out);
        bump(
            inner.by_model.entry(model.to_string()).or_default(),
            tokens_in,
            tokens_out,
        );
    }

    pub fn totals(&self) -> UsageTotals {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).totals
    }

    /// Per-model breakdown, sorted by model id for stable output.
    pub fn by_model(&self) -> Vec<(String, UsageTotals)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<_> = inner
            .by_model
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn estimate_cost(&self, input_cost_per_1k: f64, output_cost_per_1k: f64) -> f64 {
        let totals = self.totals();
        crate::budget::estimate_cost(
            totals.tokens_in,
            totals.tokens_out,
            input_cost_per_1k,
            output_cost_per_1k,
        )
    }
}
