use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use guildpress_core::types::{ChannelRecord, SyncType};
use guildpress_store::Store;

use crate::error::{Result, ScrapeError};
use crate::fetch::{fetch_messages, FetchOptions};
use crate::source::{MessageBundle, MessageSource};

#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub sync_type: SyncType,
    /// Restrict to channels with these names (case-insensitive).
    pub channel_names: Option<Vec<String>>,
    /// Per-channel message cap.
    pub limit: Option<usize>,
    pub delay_ms: u64,
    /// Enumerate and count without writing anything.
    pub dry_run: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            sync_type: SyncType::Incremental,
            channel_names: None,
            limit: None,
            delay_ms: 100,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeSummary {
    /// Absent on dry runs, which write nothing.
    pub sync_id: Option<i64>,
    pub channels_scraped: usize,
    pub channels_failed: usize,
    pub messages_processed: i64,
}

/// Drive one full scrape pass: upsert the guild, open a sync row,
/// walk every readable channel, and close the sync row with the
/// outcome. Per-channel failures are logged and skipped; cancellation
/// and store failures abort the pass and mark the sync row failed.
pub async fn run_scrape<S>(
    store: &Store,
    source: &S,
    guild_id: &str,
    opts: &ScrapeOptions,
    cancel: &CancellationToken,
) -> Result<ScrapeSummary>
where
    S: MessageSource + ?Sized,
{
    let guild = source.fetch_guild(guild_id).await?;
    let sync_id = if opts.dry_run {
        None
    } else {
        store.upsert_guild(&guild)?;
        Some(store.begin_sync(opts.sync_type, Some(guild_id), None)?)
    };

    match scrape_channels(store, source, guild_id, opts, cancel).await {
        Ok(mut summary) => {
            summary.sync_id = sync_id;
            if let Some(id) = sync_id {
                store.complete_sync(id, summary.messages_processed)?;
            }
            info!(
                channels = summary.channels_scraped,
                failed = summary.channels_failed,
                messages = summary.messages_processed,
                "scrape pass complete"
            );
            Ok(summary)
        }
        Err(e) => {
            if let Some(id) = sync_id {
                let reason = match &e {
                    ScrapeError::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                };
                store.fail_sync(id, &reason)?;
            }
            Err(e)
        }
    }
}

async fn scrape_channels<S>(
    store: &Store,
    source: &S,
    guild_id: &str,
    opts: &ScrapeOptions,
    cancel: &CancellationToken,
) -> Result<ScrapeSummary>
where
    S: MessageSource + ?Sized,
{
    let mut channels = source.list_text_channels(guild_id).await?;
    if let Some(names) = &opts.channel_names {
        channels.retain(|c| names.iter().any(|n| n.eq_ignore_ascii_case(&c.name)));
    }
    info!(count = channels.len(), "channels selected");

    let mut summary = ScrapeSummary::default();
    for channel in &channels {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        match scrape_channel(store, source, channel, opts, cancel).await {
            Ok(count) => {
                summary.channels_scraped += 1;
                summary.messages_processed += count;
            }
            Err(ScrapeError::Cancelled) => return Err(ScrapeError::Cancelled),
            // Store failures are fatal to the pass; anything else is
            // a per-channel problem worth skipping past.
            Err(ScrapeError::Store(e)) => return Err(ScrapeError::Store(e)),
            Err(e) => {
                warn!(channel = %channel.name, error = %e, "channel scrape failed, skipping");
                summary.channels_failed += 1;
            }
        }
    }
    Ok(summary)
}

/// Scrape one channel, persisting bundles in FK order (author before
/// message before children) and advancing the resume cursor only after
/// the whole channel succeeds.
async fn scrape_channel<S>(
    store: &Store,
    source: &S,
    channel: &ChannelRecord,
    opts: &ScrapeOptions,
    cancel: &CancellationToken,
) -> Result<i64>
where
    S: MessageSource + ?Sized,
{
    if !opts.dry_run {
        store.upsert_channel(channel)?;
    }

    // The upsert never touches cursor columns, so reading after it
    // still returns the previous run's watermark.
    let after = if opts.sync_type == SyncType::Incremental && !opts.dry_run {
        store
            .get_channel(&channel.id)?
            .and_then(|c| c.last_scraped_message_id)
    } else {
        None
    };

    let fetch_opts = FetchOptions {
        after,
        before: None,
        limit: opts.limit,
        delay_ms: opts.delay_ms,
    };

    let stream = fetch_messages(source, &channel.id, fetch_opts);
    tokio::pin!(stream);

    let mut count = 0i64;
    let mut max_id: Option<String> = None;
    while let Some(item) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        let bundle = item?;
        if !opts.dry_run {
            persist_bundle(store, &bundle)?;
        }
        if max_id.as_deref().is_none_or(|m| bundle.message.id.as_str() > m) {
            max_id = Some(bundle.message.id.clone());
        }
        count += 1;
    }

    if let (Some(max_id), false) = (&max_id, opts.dry_run) {
        store.update_channel_last_scraped(&channel.id, max_id)?;
    }

    info!(channel = %channel.name, messages = count, "channel complete");
    Ok(count)
}

fn persist_bundle(store: &Store, bundle: &MessageBundle) -> Result<()> {
    store.upsert_user(&bundle.author)?;
    store.upsert_message(&bundle.message)?;
    if !bundle.embeds.is_empty() {
        store.replace_embeds(&bundle.message.id, &bundle.embeds)?;
    }
    for attachment in &bundle.attachments {
        store.upsert_attachment(attachment)?;
    }
    for reaction in &bundle.reactions {
        store.upsert_reaction(reaction)?;
    }
    Ok(())
}
