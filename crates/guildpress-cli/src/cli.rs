use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "guildpress",
    about = "Scrape a Discord guild and distill it into marketing content",
    version
)]
pub struct Cli {
    /// Path to the JSON config file (default ./guildpress.json).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch guild history into the local store.
    Scrape(ScrapeArgs),
    /// Database utilities.
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// Export stored data to JSON or CSV files.
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },
    /// Run or inspect the AI processing pipeline.
    Process {
        #[command(subcommand)]
        command: ProcessCommand,
    },
}

#[derive(Args)]
pub struct ScrapeArgs {
    /// Re-fetch full history instead of resuming from cursors.
    #[arg(long, conflicts_with = "incremental")]
    pub full: bool,
    /// Resume each channel from its last scraped message (default).
    #[arg(long)]
    pub incremental: bool,
    /// Only scrape channels with these names.
    #[arg(long = "channel", num_args = 1..)]
    pub channels: Option<Vec<String>>,
    /// Per-channel message cap.
    #[arg(long)]
    pub limit: Option<usize>,
    /// Inter-request delay in milliseconds (overrides config).
    #[arg(long)]
    pub delay: Option<u64>,
    /// Enumerate and count without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum DbCommand {
    /// Create the database file and apply pending migrations.
    Init,
    /// Print table counts, message time range, and file size.
    Stats,
    /// Print the database file path.
    Path,
}

#[derive(Subcommand)]
pub enum ExportCommand {
    /// Messages with authors, optionally with child rows.
    Messages(ExportArgs),
    /// The channel list with scrape cursors.
    Channels(ExportArgs),
    /// Daily and weekly summaries plus extracts.
    Summary(ExportArgs),
}

#[derive(Args)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
    pub format: ExportFormat,
    /// Inclusive UTC date lower bound.
    #[arg(long)]
    pub since: Option<NaiveDate>,
    /// Inclusive UTC date upper bound.
    #[arg(long)]
    pub until: Option<NaiveDate>,
    #[arg(long)]
    pub include_embeds: bool,
    #[arg(long)]
    pub include_attachments: bool,
    #[arg(long)]
    pub include_reactions: bool,
    /// Pretty-print JSON output.
    #[arg(long)]
    pub pretty: bool,
    /// Output file; defaults to a timestamped name under the
    /// configured export directory.
    #[arg(long)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
pub enum ProcessCommand {
    /// Run one stage or every enabled stage.
    Run(ProcessRunArgs),
    /// Show memoization counts per stage and extract totals.
    Status,
    /// Delete a stage's memoized results.
    Reset {
        /// filter | categorize | summarize | extract | format
        stage: String,
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Args)]
pub struct ProcessRunArgs {
    /// filter | categorize | summarize | extract | format
    #[arg(long, conflicts_with = "all")]
    pub stage: Option<String>,
    /// Run every stage enabled in config, in dependency order.
    #[arg(long)]
    pub all: bool,
    /// Restrict to one channel (id or name).
    #[arg(long)]
    pub channel: Option<String>,
    #[arg(long)]
    pub since: Option<NaiveDate>,
    #[arg(long)]
    pub until: Option<NaiveDate>,
    /// Candidate cap for the stage.
    #[arg(long)]
    pub limit: Option<i64>,
    /// Reprocess entities that already have results.
    #[arg(long)]
    pub force: bool,
    /// Select and batch without calling the model or writing.
    #[arg(long)]
    pub dry_run: bool,
}
