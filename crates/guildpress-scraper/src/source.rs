use async_trait::async_trait;

use guildpress_core::types::{
    AttachmentRecord, ChannelRecord, EmbedRecord, GuildRecord, MessageRecord, ReactionRecord,
    UserRecord,
};

use crate::error::Result;

/// One underlying history request: at most 100 messages, anchored by
/// at most one of `after` / `before`.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: u8,
}

/// Everything the scraper persists for one message, fetched together.
#[derive(Debug, Clone)]
pub struct MessageBundle {
    pub message: MessageRecord,
    pub author: UserRecord,
    pub embeds: Vec<EmbedRecord>,
    pub attachments: Vec<AttachmentRecord>,
    pub reactions: Vec<ReactionRecord>,
}

/// The chat-service surface the scraper consumes. Production is the
/// serenity-backed [`crate::DiscordSession`]; tests script fixtures.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_guild(&self, guild_id: &str) -> Result<GuildRecord>;

    /// Text channels the bot can both view and read history in.
    async fn list_text_channels(&self, guild_id: &str) -> Result<Vec<ChannelRecord>>;

    /// One page of history, newest-first within the page.
    async fn fetch_page(&self, channel_id: &str, page: &PageRequest) -> Result<Vec<MessageBundle>>;
}
