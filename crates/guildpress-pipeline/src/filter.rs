use serde_json::json;
use tracing::{info, warn};

use guildpress_ai::budget::create_batches;
use guildpress_ai::validate::{self, FilterResponse};
use guildpress_ai::AiError;
use guildpress_core::types::{EntityType, Stage};
use guildpress_store::{MessageWithAuthor, StageResultWrite};

use crate::enrich;
use crate::error::Result;
use crate::report::StageReport;
use crate::{PipelineContext, StageOptions};

/// Decide keep/discard for every message that has no filter result yet.
pub async fn run_filter(ctx: &PipelineContext, opts: &StageOptions) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Filter, opts.dry_run);

    let query = opts.message_query();
    let candidates = if opts.force {
        ctx.store.messages_in_range(&query)?
    } else {
        ctx.store.unprocessed_messages(Stage::Filter, &query)?
    };
    report.candidates = candidates.len();
    if candidates.is_empty() {
        return Ok(report);
    }

    let batches = create_batches(
        candidates,
        ctx.settings.max_tokens_per_batch,
        ctx.settings.batch_size,
        enrich::estimate_row,
    );
    report.batches = batches.len();
    if opts.dry_run {
        return Ok(report);
    }

    for (batch_index, batch) in batches.iter().enumerate() {
        let ids: Vec<String> = batch.iter().map(|r| r.message.id.clone()).collect();
        match filter_batch(ctx, batch).await {
            Ok(response) => persist_decisions(ctx, &ids, response, &mut report)?,
            Err(e) => {
                warn!(batch = batch_index, error = %e, "filter batch failed");
                report.fail_batch(batch_index, e, ids);
            }
        }
    }

    info!(
        kept = report.kept,
        discarded = report.discarded,
        errors = report.errors.len(),
        "filter stage complete"
    );
    Ok(report.finish(ctx))
}

async fn filter_batch(
    ctx: &PipelineContext,
    batch: &[MessageWithAuthor],
) -> std::result::Result<FilterResponse, AiError> {
    let payload = enrich::prepare_batch(batch, ctx.settings.anonymize);
    let prompt = ctx
        .prompts
        .render("filter", &[("MESSAGES", serde_json::to_value(&payload)?)])?;
    let response = ctx.complete(prompt).await?;
    validate::parse_filter(&response.json)
}

fn persist_decisions(
    ctx: &PipelineContext,
    batch_ids: &[String],
    response: FilterResponse,
    report: &mut StageReport,
) -> Result<()> {
    for decision in response.decisions {
        // Results key on the original message id; anything the model
        // invented is dropped rather than persisted.
        if !batch_ids.contains(&decision.id) {
            warn!(id = %decision.id, "filter decision for unknown message id, ignoring");
            continue;
        }
        let result = json!({
            "keep": decision.keep,
            "reason": decision.reason,
            "quality_score": decision.quality_score,
        });
        ctx.store.record_stage_result(&StageResultWrite {
            entity_type: EntityType::Message,
            entity_id: &decision.id,
            stage: Stage::Filter,
            result: &result,
            model_used: &ctx.settings.model,
            tokens_in: None,
            tokens_out: None,
        })?;
        report.processed += 1;
        if decision.keep {
            report.kept += 1;
        } else {
            report.discarded += 1;
        }
    }
    Ok(())
}
