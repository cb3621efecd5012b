use chrono::{Datelike, Days, NaiveDate};
use serde_json::{json, Value};
use tracing::{info, warn};

use guildpress_ai::validate;
use guildpress_ai::AiError;
use guildpress_core::types::{ChannelRecord, EntityType, Stage};
use guildpress_store::{MessageWithAuthor, StageResultWrite};

use crate::enrich;
use crate::error::Result;
use crate::report::StageReport;
use crate::{PipelineContext, StageOptions};

/// Daily digests for every (channel, day) in the requested range,
/// followed by weekly guild rollups for each week the range touches.
///
/// Daily rows are keyed `channelId:date`, weekly rows
/// `guildId:week:monday`. Each key is written at most once unless
/// forced.
pub async fn run_summarize(ctx: &PipelineContext, opts: &StageOptions) -> Result<StageReport> {
    let mut report = StageReport::new(Stage::Summarize, opts.dry_run);

    let until = opts.until.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let since = opts.since.unwrap_or(until);

    let mut date = since;
    while date <= until {
        run_daily(ctx, date, opts, &mut report).await?;
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    let mut week = monday_of(since);
    let last_week = monday_of(until);
    while week <= last_week {
        run_weekly(ctx, week, opts, &mut report).await?;
        match week.checked_add_days(Days::new(7)) {
            Some(next) => week = next,
            None => break,
        }
    }

    info!(
        summaries = report.summaries_written,
        errors = report.errors.len(),
        "summarize stage complete"
    );
    Ok(report.finish(ctx))
}

async fn run_daily(
    ctx: &PipelineContext,
    date: NaiveDate,
    opts: &StageOptions,
    report: &mut StageReport,
) -> Result<()> {
    let mut channels = ctx.store.channels_with_kept_messages(date)?;
    if let Some(channel_id) = &opts.channel_id {
        channels.retain(|c| &c.id == channel_id);
    }

    for channel in channels {
        let key = format!("{}:{}", channel.id, date);
        if !ctx.store.should_process(
            EntityType::DailySummary,
            &key,
            Stage::Summarize,
            opts.force,
            ctx.settings.reprocess_after_days,
        )? {
            continue;
        }
        let rows = ctx.store.kept_messages_for_day(&channel.id, date)?;
        if rows.is_empty() {
            continue;
        }

        let batch_index = report.candidates;
        report.candidates += 1;
        if opts.dry_run {
            continue;
        }

        match summarize_channel_day(ctx, &channel, date, &rows).await {
            Ok(mut result) => {
                if let Some(obj) = result.as_object_mut() {
                    obj.insert("channel_id".into(), json!(channel.id));
                    obj.insert("date".into(), json!(date.to_string()));
                    obj.insert("message_count".into(), json!(rows.len()));
                }
                ctx.store.record_stage_result(&StageResultWrite {
                    entity_type: EntityType::DailySummary,
                    entity_id: &key,
                    stage: Stage::Summarize,
                    result: &result,
                    model_used: &ctx.settings.model,
                    tokens_in: None,
                    tokens_out: None,
                })?;
                report.processed += 1;
                report.summaries_written += 1;
            }
            Err(e) => {
                warn!(channel = %channel.name, %date, error = %e, "daily summary failed");
                report.fail_batch(batch_index, e, vec![key]);
            }
        }
    }
    Ok(())
}

async fn summarize_channel_day(
    ctx: &PipelineContext,
    channel: &ChannelRecord,
    date: NaiveDate,
    rows: &[MessageWithAuthor],
) -> std::result::Result<Value, AiError> {
    let payload = enrich::prepare_batch(rows, ctx.settings.anonymize);
    let prompt = ctx.prompts.render(
        "summarize_daily",
        &[
            ("CHANNEL_NAME", json!(channel.name)),
            ("DATE", json!(date.to_string())),
            ("MESSAGES", serde_json::to_value(&payload)?),
        ],
    )?;
    let response = ctx.complete(prompt).await?;
    validate::parse_summary(&response.json)?;
    Ok(response.json)
}

async fn run_weekly(
    ctx: &PipelineContext,
    week_start: NaiveDate,
    opts: &StageOptions,
    report: &mut StageReport,
) -> Result<()> {
    let (guild_id, guild_name) = match ctx.store.first_guild()? {
        Some(guild) => (guild.id, guild.name),
        None if !ctx.settings.guild_id.is_empty() => {
            (ctx.settings.guild_id.clone(), ctx.settings.guild_id.clone())
        }
        None => {
            warn!("no guild known, skipping weekly rollup");
            return Ok(());
        }
    };

    let key = format!("{guild_id}:week:{week_start}");
    if !ctx.store.should_process(
        EntityType::WeeklySummary,
        &key,
        Stage::Summarize,
        opts.force,
        ctx.settings.reprocess_after_days,
    )? {
        return Ok(());
    }

    // Select by the date suffix of the daily key. The id portion may
    // itself contain ':', so only the text after the last ':' is read
    // as a date.
    let week_end = week_start.checked_add_days(Days::new(6)).unwrap_or(week_start);
    let dailies = ctx
        .store
        .stage_results(EntityType::DailySummary, Stage::Summarize)?;
    let in_week: Vec<Value> = dailies
        .iter()
        .filter(|row| {
            entity_date(&row.entity_id)
                .is_some_and(|d| d >= week_start && d <= week_end)
        })
        .map(|row| row.result.clone())
        .collect();
    if in_week.is_empty() {
        return Ok(());
    }

    let batch_index = report.candidates;
    report.candidates += 1;
    if opts.dry_run {
        return Ok(());
    }

    match summarize_week(ctx, &guild_name, week_start, &in_week).await {
        Ok(mut result) => {
            if let Some(obj) = result.as_object_mut() {
                obj.insert("week_start".into(), json!(week_start.to_string()));
                obj.insert("days_aggregated".into(), json!(in_week.len()));
            }
            ctx.store.record_stage_result(&StageResultWrite {
                entity_type: EntityType::WeeklySummary,
                entity_id: &key,
                stage: Stage::Summarize,
                result: &result,
                model_used: &ctx.settings.model,
                tokens_in: None,
                tokens_out: None,
            })?;
            report.processed += 1;
            report.summaries_written += 1;
        }
        Err(e) => {
            warn!(week = %week_start, error = %e, "weekly summary failed");
            report.fail_batch(batch_index, e, vec![key]);
        }
    }
    Ok(())
}

async fn summarize_week(
    ctx: &PipelineContext,
    guild_name: &str,
    week_start: NaiveDate,
    summaries: &[Value],
) -> std::result::Result<Value, AiError> {
    let prompt = ctx.prompts.render(
        "summarize_weekly",
        &[
            ("GUILD_NAME", json!(guild_name)),
            ("WEEK_START", json!(week_start.to_string())),
            ("SUMMARIES", json!(summaries)),
        ],
    )?;
    let response = ctx.complete(prompt).await?;
    validate::parse_summary(&response.json)?;
    Ok(response.json)
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    let back = u64::from(date.weekday().num_days_from_monday());
    date.checked_sub_days(Days::new(back)).unwrap_or(date)
}

fn entity_date(entity_id: &str) -> Option<NaiveDate> {
    let (_, suffix) = entity_id.rsplit_once(':')?;
    suffix.parse().ok()
}
