use clap::Parser;

use guildpress_core::config::{GuildpressConfig, LogFormat, LoggingConfig};

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let config = GuildpressConfig::load(args.config.as_deref())?;
    init_tracing(&config.logging);

    match args.command {
        cli::Command::Scrape(scrape_args) => commands::scrape::run(&config, scrape_args).await,
        cli::Command::Db { command } => commands::db::run(&config, command),
        cli::Command::Export { command } => commands::export::run(&config, command),
        cli::Command::Process { command } => commands::process::run(&config, command).await,
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
