use serde::Serialize;
use tracing::info;

use guildpress_core::types::Stage;
use guildpress_store::Store;

use crate::error::Result;
use crate::report::StageReport;
use crate::{categorize, extract, filter, format, summarize};
use crate::{PipelineContext, StageOptions};

/// Run one stage by name.
pub async fn run_stage(
    ctx: &PipelineContext,
    stage: Stage,
    opts: &StageOptions,
) -> Result<StageReport> {
    match stage {
        Stage::Filter => filter::run_filter(ctx, opts).await,
        Stage::Categorize => categorize::run_categorize(ctx, opts).await,
        Stage::Summarize => summarize::run_summarize(ctx, opts).await,
        Stage::Extract => extract::run_extract(ctx, opts).await,
        Stage::Format => format::run_format(ctx, opts).await,
    }
}

/// Run every enabled stage in dependency order. A stage's batch-level
/// failures are carried in its report; only store failures abort the
/// sequence.
pub async fn run_all(ctx: &PipelineContext, opts: &StageOptions) -> Result<Vec<StageReport>> {
    let mut reports = Vec::new();
    for stage in Stage::ALL {
        if !ctx.settings.stages.enabled(stage) {
            info!(stage = %stage, "stage disabled, skipping");
            continue;
        }
        reports.push(run_stage(ctx, stage, opts).await?);
    }
    Ok(reports)
}

/// Memoization counts per stage plus extract totals, for
/// `process status`.
#[derive(Debug, Clone, Serialize)]
pub struct StageStatus {
    pub stages: Vec<(String, i64)>,
    pub extracts: Vec<(String, i64)>,
    pub last_sync: Option<guildpress_core::types::SyncState>,
}

pub fn pipeline_status(store: &Store) -> Result<StageStatus> {
    Ok(StageStatus {
        stages: store
            .stage_counts()?
            .into_iter()
            .map(|(stage, count)| (stage.to_string(), count))
            .collect(),
        extracts: store.extract_counts()?,
        last_sync: store.last_sync()?,
    })
}

/// Drop a stage's memoized rows so the next run redoes it.
pub fn reset_stage(store: &Store, stage: Stage) -> Result<usize> {
    let removed = store.delete_stage_results(stage)?;
    info!(stage = %stage, removed, "stage results reset");
    Ok(removed)
}
