use tracing::{info, warn};

use guildpress_ai::validate;
use guildpress_ai::AiError;
use guildpress_core::types::Stage;
use guildpress_store::ExtractRow;

use crate::error::Result;
use crate::report::StageReport;
use crate::{PipelineContext, StageOptions};

const DEFAULT_FORMAT_LIMIT: i64 = 50;

/// Turn raw extracts into channel-ready copy. An extract is pending
/// until `formatted_content` is set; that write is the done marker.
pub async fn run_format(ctx: &PipelineContext, opts: &StageOptions) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Format, opts.dry_run);

    let limit = opts.limit.unwrap_or(DEFAULT_FORMAT_LIMIT);
    let pending = ctx.store.pending_format_extracts(limit)?;
    report.candidates = pending.len();
    if pending.is_empty() || opts.dry_run {
        return Ok(report);
    }

    for (index, extract) in pending.iter().enumerate() {
        match format_extract(ctx, extract).await {
            Ok(formatted) => {
                ctx.store.set_formatted_content(extract.id, &formatted)?;
                report.processed += 1;
            }
            Err(e) => {
                warn!(extract = extract.id, error = %e, "format failed");
                report.fail_batch(index, e, vec![extract.id.to_string()]);
            }
        }
    }

    info!(
        formatted = report.processed,
        errors = report.errors.len(),
        "format stage complete"
    );
    Ok(report.finish(ctx))
}

async fn format_extract(
    ctx: &PipelineContext,
    extract: &ExtractRow,
) -> std::result::Result<String, AiError> {
    let prompt = ctx.prompts.render(
        "format_extract",
        &[("EXTRACT", serde_json::to_value(extract)?)],
    )?;
    let response = ctx.complete(prompt).await?;
    let parsed = validate::parse_format(&response.json)?;
    Ok(parsed.formatted)
}
