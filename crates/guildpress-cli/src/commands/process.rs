use std::sync::Arc;

use anyhow::{anyhow, bail};

use guildpress_ai::HttpChatClient;
use guildpress_core::config::GuildpressConfig;
use guildpress_core::types::Stage;
use guildpress_pipeline::{
    pipeline_status, reset_stage, run_all, run_stage, PipelineContext, StageOptions, StageReport,
};
use guildpress_store::Store;

use crate::cli::{ProcessCommand, ProcessRunArgs};

pub async fn run(config: &GuildpressConfig, command: ProcessCommand) -> anyhow::Result<()> {
    match command {
        ProcessCommand::Status => {
            let store = Store::open(&config.database.path)?;
            let status = pipeline_status(&store)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        ProcessCommand::Reset { stage, confirm } => {
            let stage: Stage = stage.parse().map_err(|e: String| anyhow!(e))?;
            if !confirm {
                bail!("refusing to reset {stage} results without --confirm");
            }
            let store = Store::open(&config.database.path)?;
            let removed = reset_stage(&store, stage)?;
            println!("removed {removed} {stage} results");
            Ok(())
        }
        ProcessCommand::Run(args) => run_pipeline(config, args).await,
    }
}

async fn run_pipeline(config: &GuildpressConfig, args: ProcessRunArgs) -> anyhow::Result<()> {
    config.require_ai()?;
    if args.stage.is_none() && !args.all {
        bail!("pass --stage <name> or --all");
    }

    let store = Arc::new(Store::open(&config.database.path)?);
    let chat = Arc::new(HttpChatClient::new(
        config.ai.api_key.clone(),
        config.ai.base_url.clone(),
    ));
    let ctx = PipelineContext::new(store.clone(), chat, config);

    let opts = StageOptions {
        channel_id: resolve_channel(&store, args.channel.as_deref())?,
        since: args.since,
        until: args.until,
        limit: args.limit,
        force: args.force,
        dry_run: args.dry_run,
    };

    let reports: Vec<StageReport> = match args.stage {
        Some(name) => {
            let stage: Stage = name.parse().map_err(|e: String| anyhow!(e))?;
            vec![run_stage(&ctx, stage, &opts).await?]
        }
        None => run_all(&ctx, &opts).await?,
    };

    for report in &reports {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

/// Accept a channel by id or by name.
fn resolve_channel(store: &Store, channel: Option<&str>) -> anyhow::Result<Option<String>> {
    let Some(wanted) = channel else {
        return Ok(None);
    };
    if store.get_channel(wanted)?.is_some() {
        return Ok(Some(wanted.to_string()));
    }
    let by_name = store
        .all_channels()?
        .into_iter()
        .find(|c| c.name.eq_ignore_ascii_case(wanted));
    match by_name {
        Some(channel) => Ok(Some(channel.id)),
        None => bail!("unknown channel: {wanted}"),
    }
}
