use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::http::{Http, MessagePagination};
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::model::permissions::Permissions;
use serenity::model::user::CurrentUser;
use tracing::{debug, info};

use guildpress_core::types::{ChannelRecord, GuildRecord};

use crate::convert;
use crate::error::{Result, ScrapeError};
use crate::source::{MessageBundle, MessageSource, PageRequest};

const CONNECT_TIMEOUT_SECS: u64 = 30;

/// REST session against Discord. The session is established with a
/// readiness probe under a hard timeout; dropping it tears the
/// connection pool down.
pub struct DiscordSession {
    http: Arc<Http>,
    bot_user: CurrentUser,
}

impl DiscordSession {
    /// Authenticate the token and verify the API is reachable. Fails
    /// after 30 s without readiness.
    pub async fn connect(token: &str) -> Result<Self> {
        let http = Http::new(token);
        let bot_user = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            http.get_current_user(),
        )
        .await
        .map_err(|_| ScrapeError::ConnectTimeout {
            secs: CONNECT_TIMEOUT_SECS,
        })??;

        info!(bot = %bot_user.name, id = %bot_user.id, "Discord session ready");
        Ok(Self {
            http: Arc::new(http),
            bot_user,
        })
    }

    pub fn bot_id(&self) -> String {
        self.bot_user.id.to_string()
    }
}

#[async_trait]
impl MessageSource for DiscordSession {
    async fn fetch_guild(&self, guild_id: &str) -> Result<GuildRecord> {
        let gid = GuildId::new(convert::parse_id(guild_id)?);
        let guild = self.http.get_guild(gid).await?;
        Ok(GuildRecord {
            id: guild.id.to_string(),
            name: guild.name.clone(),
            icon_url: guild.icon_url(),
            member_count: guild.approximate_member_count.map(|c| c as i64),
        })
    }

    async fn list_text_channels(&self, guild_id: &str) -> Result<Vec<ChannelRecord>> {
        let gid = GuildId::new(convert::parse_id(guild_id)?);
        let guild = self.http.get_guild(gid).await?;
        let channels = self.http.get_channels(gid).await?;
        let member = self.http.get_member(gid, self.bot_user.id).await?;

        let required = Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY;
        let mut out = Vec::new();
        for channel in &channels {
            if !convert::is_text_kind(channel.kind) {
                continue;
            }
            let perms = guild.user_permissions_in(channel, &member);
            if !perms.contains(required) {
                debug!(channel = %channel.name, "skipping: missing read permissions");
                continue;
            }
            out.push(convert::channel_record(channel));
        }
        Ok(out)
    }

    async fn fetch_page(&self, channel_id: &str, page: &PageRequest) -> Result<Vec<MessageBundle>> {
        let cid = ChannelId::new(convert::parse_id(channel_id)?);
        let target = match (&page.after, &page.before) {
            (Some(after), _) => Some(MessagePagination::After(MessageId::new(
                convert::parse_id(after)?,
            ))),
            (None, Some(before)) => Some(MessagePagination::Before(MessageId::new(
                convert::parse_id(before)?,
            ))),
            (None, None) => None,
        };

        let messages = self
            .http
            .get_messages(cid, target, Some(page.limit))
            .await?;
        Ok(messages.iter().map(convert::bundle).collect())
    }
}
