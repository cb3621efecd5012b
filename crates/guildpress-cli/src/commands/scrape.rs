use tokio_util::sync::CancellationToken;
use tracing::info;

use guildpress_core::config::GuildpressConfig;
use guildpress_core::types::SyncType;
use guildpress_scraper::{run_scrape, DiscordSession, ScrapeOptions};
use guildpress_store::Store;

use crate::cli::ScrapeArgs;

pub async fn run(config: &GuildpressConfig, args: ScrapeArgs) -> anyhow::Result<()> {
    config.require_discord()?;

    let store = Store::open(&config.database.path)?;
    let session = DiscordSession::connect(&config.discord.token).await?;

    // Ctrl-C stops the paginator at its next iteration and marks the
    // sync row failed with "cancelled".
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling scrape");
            cancel_on_signal.cancel();
        }
    });

    let sync_type = if args.full {
        SyncType::Full
    } else if args.channels.is_some() {
        SyncType::Channel
    } else {
        SyncType::Incremental
    };

    let opts = ScrapeOptions {
        sync_type,
        channel_names: args.channels,
        limit: args.limit,
        delay_ms: args.delay.unwrap_or(config.scraper.delay_between_requests),
        dry_run: args.dry_run,
    };

    let summary = run_scrape(&store, &session, &config.discord.guild_id, &opts, &cancel).await?;

    println!(
        "{} {} messages across {} channels ({} failed)",
        if args.dry_run { "would scrape" } else { "scraped" },
        summary.messages_processed,
        summary.channels_scraped,
        summary.channels_failed,
    );
    Ok(())
}
