use std::collections::HashMap;

use serde_json::json;
use tracing::{info, warn};

use guildpress_ai::budget::create_batches;
use guildpress_ai::validate::{self, ExtractResponse};
use guildpress_ai::AiError;
use guildpress_core::types::{EntityType, ExtractType, Sentiment, Stage};
use guildpress_store::{MessageWithAuthor, NewExtract, StageResultWrite};

use crate::enrich;
use crate::error::Result;
use crate::report::StageReport;
use crate::{PipelineContext, StageOptions};

const DEFAULT_CANDIDATE_LIMIT: i64 = 100;

/// The three independent sub-extractors, run in sequence over the same
/// candidate batches. A failure in one does not stop the others.
const EXTRACTORS: [(ExtractType, &str); 3] = [
    (ExtractType::Quote, "extract_quote"),
    (ExtractType::Announcement, "extract_announcement"),
    (ExtractType::Faq, "extract_faq"),
];

/// Mine typed marketing artifacts from high-relevance kept messages.
pub async fn run_extract(ctx: &PipelineContext, opts: &StageOptions) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Extract, opts.dry_run);

    let limit = opts.limit.unwrap_or(DEFAULT_CANDIDATE_LIMIT);
    let candidates = ctx.store.extract_candidates(limit, opts.force)?;
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

    // Messages are memoized as extracted once any sub-extractor has
    // successfully covered them, so a partial failure leaves the rest
    // eligible for the next run.
    let mut covered: HashMap<String, usize> = HashMap::new();

    for (kind, template) in EXTRACTORS {
        for (batch_index, batch) in batches.iter().enumerate() {
            let ids: Vec<String> = batch.iter().map(|r| r.message.id.clone()).collect();
            match extract_batch(ctx, template, batch).await {
                Ok(response) => {
                    persist_extracts(ctx, kind, &ids, response, &mut report)?;
                    for id in &ids {
                        *covered.entry(id.clone()).or_default() += 1;
                    }
                }
                Err(e) => {
                    warn!(extractor = %kind, batch = batch_index, error = %e, "extractor batch failed");
                    report.fail_batch(batch_index, format!("{kind}: {e}"), ids);
                }
            }
        }
    }

    for (id, successes) in &covered {
        ctx.store.record_stage_result(&StageResultWrite {
            entity_type: EntityType::Message,
            entity_id: id,
            stage: Stage::Extract,
            result: &json!({"extractors_run": successes}),
            model_used: &ctx.settings.model,
            tokens_in: None,
            tokens_out: None,
        })?;
        report.processed += 1;
    }

    info!(
        extracts = report.extracts_by_type.values().sum::<usize>(),
        errors = report.errors.len(),
        "extract stage complete"
    );
    Ok(report.finish(ctx))
}

async fn extract_batch(
    ctx: &PipelineContext,
    template: &str,
    batch: &[MessageWithAuthor],
) -> std::result::Result<ExtractResponse, AiError> {
    let payload = enrich::prepare_batch(batch, ctx.settings.anonymize);
    let prompt = ctx
        .prompts
        .render(template, &[("MESSAGES", serde_json::to_value(&payload)?)])?;
    let response = ctx.complete(prompt).await?;
    validate::parse_extracts(&response.json)
}

fn persist_extracts(
    ctx: &PipelineContext,
    kind: ExtractType,
    batch_ids: &[String],
    response: ExtractResponse,
    report: &mut StageReport,
) -> Result<()> {
    // Type-specific defaults: quotes read as praise and need consent
    // before publication; announcements and FAQs are factual.
    let (sentiment, default_permission) = match kind {
        ExtractType::Quote => (Sentiment::Positive, true),
        ExtractType::Announcement => (Sentiment::Neutral, false),
        _ => (Sentiment::Neutral, false),
    };

    for item in response.extracts {
        let source_id = item.source_id().to_string();
        if !batch_ids.contains(&source_id) {
            warn!(id = %source_id, "extract for unknown message id, ignoring");
            continue;
        }
        let topics = message_topics(ctx, &source_id)?;
        ctx.store.insert_extract(&NewExtract {
            source_type: "message".into(),
            source_id,
            // The sub-extractor decides the type; a stray value echoed
            // by the model does not reclassify the artifact.
            extract_type: kind,
            title: item.context.clone(),
            content: item.content,
            relevance_score: item.relevance_score.unwrap_or(0.5),
            sentiment,
            topics,
            requires_permission: item.requires_permission.unwrap_or(default_permission),
        })?;
        *report.extracts_by_type.entry(kind.to_string()).or_default() += 1;
    }
    Ok(())
}

/// Topics ride along from the message's categorization when present.
fn message_topics(ctx: &PipelineContext, message_id: &str) -> Result<Vec<String>> {
    let Some(row) = ctx
        .store
        .get_stage_result(EntityType::Message, message_id, Stage::Categorize)?
    else {
        return Ok(Vec::new());
    };
    let mut topics = Vec::new();
    if let Some(primary) = row.result.get("primary_topic").and_then(|v| v.as_str()) {
        topics.push(primary.to_string());
    }
    if let Some(secondary) = row.result.get("secondary_topics").and_then(|v| v.as_array()) {
        topics.extend(
            secondary
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from),
        );
    }
    Ok(topics)
}
