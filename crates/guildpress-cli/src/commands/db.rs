use guildpress_core::config::GuildpressConfig;
use guildpress_store::Store;

use crate::cli::DbCommand;

pub fn run(config: &GuildpressConfig, command: DbCommand) -> anyhow::Result<()> {
    match command {
        DbCommand::Init => {
            Store::open(&config.database.path)?;
            println!("database ready at {}", config.database.path);
        }
        DbCommand::Stats => {
            let store = Store::open(&config.database.path)?;
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        DbCommand::Path => {
            println!("{}", config.database.path);
        }
    }
    Ok(())
}
