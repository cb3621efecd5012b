use serde_json::json;
use tracing::{info, warn};

use guildpress_ai::budget::create_batches;
use guildpress_ai::validate::{self, CategorizeResponse};
use guildpress_ai::AiError;
use guildpress_core::types::{EntityType, Stage};
use guildpress_store::{MessageWithAuthor, StageResultWrite};

use crate::enrich;
use crate::error::Result;
use crate::report::StageReport;
use crate::{PipelineContext, StageOptions};

/// Tag every filter-kept message that has no categorize result yet
/// with topic, sentiment, urgency, and marketing relevance.
pub async fn run_categorize(ctx: &PipelineContext, opts: &StageOptions) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Categorize, opts.dry_run);

    let candidates: Vec<MessageWithAuthor> = if opts.force {
        ctx.store
            .processed_messages(Stage::Filter, true, opts.limit)?
            .into_iter()
            .map(|(row, _)| row)
            .collect()
    } else {
        ctx.store
            .kept_unprocessed_messages(Stage::Categorize, &opts.message_query())?
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
        match categorize_batch(ctx, batch).await {
            Ok(response) => persist_categorizations(ctx, &ids, response, &mut report)?,
            Err(e) => {
                warn!(batch = batch_index, error = %e, "categorize batch failed");
                report.fail_batch(batch_index, e, ids);
            }
        }
    }

    info!(
        processed = report.processed,
        errors = report.errors.len(),
        "categorize stage complete"
    );
    Ok(report.finish(ctx))
}

async fn categorize_batch(
    ctx: &PipelineContext,
    batch: &[MessageWithAuthor],
) -> std::result::Result<CategorizeResponse, AiError> {
    let payload = enrich::prepare_batch(batch, ctx.settings.anonymize);
    let prompt = ctx
        .prompts
        .render("categorize", &[("MESSAGES", serde_json::to_value(&payload)?)])?;
    let response = ctx.complete(prompt).await?;
    validate::parse_categorize(&response.json)
}

fn persist_categorizations(
    ctx: &PipelineContext,
    batch_ids: &[String],
    response: CategorizeResponse,
    report: &mut StageReport,
) -> Result<()> {
    for cat in response.categorizations {
        if !batch_ids.contains(&cat.id) {
            warn!(id = %cat.id, "categorization for unknown message id, ignoring");
            continue;
        }
        let result = json!({
            "primary_topic": cat.primary_topic,
            "secondary_topics": cat.secondary_topics,
            "sentiment": cat.sentiment,
            "urgency": cat.urgency,
            "marketing_relevance": cat.marketing_relevance,
        });
        ctx.store.record_stage_result(&StageResultWrite {
            entity_type: EntityType::Message,
            entity_id: &cat.id,
            stage: Stage::Categorize,
            result: &result,
            model_used: &ctx.settings.model,
            tokens_in: None,
            tokens_out: None,
        })?;
        report.processed += 1;
        *report.topics.entry(cat.primary_topic).or_default() += 1;
        *report
            .sentiments
            .entry(cat.sentiment.to_string())
            .or_default() += 1;
        *report
            .relevance
            .entry(cat.marketing_relevance.to_string())
            .or_default() += 1;
    }
    Ok(())
}
