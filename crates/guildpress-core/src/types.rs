use serde::{Deserialize, Serialize};

/// Kind of scrape pass recorded in `sync_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Full,
    Incremental,
    Channel,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            "channel" => Ok(Self::Channel),
            other => Err(format!("unknown sync type: {other}")),
        }
    }
}

/// Lifecycle of a sync row: in_progress -> completed | failed, terminal once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown sync status: {other}")),
        }
    }
}

/// Pipeline phase. Registered order: filter -> categorize -> summarize
/// -> extract -> format. Each later stage reads only what earlier
/// stages have persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Filter,
    Categorize,
    Summarize,
    Extract,
    Format,
}

impl Stage {
    /// All stages in dependency order.
    pub const ALL: [Stage; 5] = [
        Stage::Filter,
        Stage::Categorize,
        Stage::Summarize,
        Stage::Extract,
        Stage::Format,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::Categorize => write!(f, "categorize"),
            Self::Summarize => write!(f, "summarize"),
            Self::Extract => write!(f, "extract"),
            Self::Format => write!(f, "format"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filter" => Ok(Self::Filter),
            "categorize" => Ok(Self::Categorize),
            "summarize" => Ok(Self::Summarize),
            "extract" => Ok(Self::Extract),
            "format" => Ok(Self::Format),
            other => Err(format!("unknown stage: {other}")),
        }
    }
}

/// What a memoization row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Message,
    Channel,
    DailySummary,
    WeeklySummary,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Channel => write!(f, "channel"),
            Self::DailySummary => write!(f, "daily_summary"),
            Self::WeeklySummary => write!(f, "weekly_summary"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "channel" => Ok(Self::Channel),
            "daily_summary" => Ok(Self::DailySummary),
            "weekly_summary" => Ok(Self::WeeklySummary),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Neutral => write!(f, "neutral"),
            Self::Negative => write!(f, "negative"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Relevance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Typed marketing artifact kinds stored in `marketing_extracts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractType {
    Announcement,
    Quote,
    Faq,
    Highlight,
    SocialPost,
}

impl std::fmt::Display for ExtractType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Announcement => write!(f, "announcement"),
            Self::Quote => write!(f, "quote"),
            Self::Faq => write!(f, "faq"),
            Self::Highlight => write!(f, "highlight"),
            Self::SocialPost => write!(f, "social_post"),
        }
    }
}

impl std::str::FromStr for ExtractType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "announcement" => Ok(Self::Announcement),
            "quote" => Ok(Self::Quote),
            "faq" => Ok(Self::Faq),
            "highlight" => Ok(Self::Highlight),
            "social_post" => Ok(Self::SocialPost),
            other => Err(format!("unknown extract type: {other}")),
        }
    }
}

/// Guild row. One per run; upserted on every scrape pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRecord {
    pub id: String,
    pub name: String,
    pub icon_url: Option<String>,
    pub member_count: Option<i64>,
}

/// Channel row. `last_scraped_message_id` is the resume high-watermark:
/// the lexicographic max of ingested message ids (Discord snowflake
/// strings of equal length sort chronologically).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: String,
    pub guild_id: String,
    pub name: String,
    pub kind: i64,
    pub parent_id: Option<String>,
    pub position: Option<i64>,
    pub topic: Option<String>,
    pub last_scraped_message_id: Option<String>,
    pub last_scraped_at: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub discriminator: String,
    pub avatar_url: Option<String>,
    pub is_bot: bool,
}

/// Message row. `timestamp` is immutable once written; content and
/// edit fields may be refreshed when an edited message is re-fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub clean_content: String,
    /// ISO-8601 UTC.
    pub timestamp: String,
    pub edited_timestamp: Option<String>,
    pub message_type: i64,
    /// Reply target, if any. Plain id hint, not an enforced FK.
    pub reference_id: Option<String>,
    pub thread_id: Option<String>,
    pub has_embeds: bool,
    pub has_attachments: bool,
    pub reaction_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedRecord {
    pub message_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: String,
    pub message_id: String,
    pub filename: String,
    pub url: String,
    pub size: i64,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub message_id: String,
    pub emoji: String,
    pub count: i64,
}

/// One row per scraper invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub id: i64,
    pub sync_type: SyncType,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub messages_processed: i64,
    pub status: SyncStatus,
    pub error_message: Option<String>,
}
