//! serenity model -> store record conversion.

use serenity::model::channel::{ChannelType, GuildChannel, Message};
use serenity::model::user::User;
use serenity::model::Timestamp;

use guildpress_core::types::{
    AttachmentRecord, ChannelRecord, EmbedRecord, MessageRecord, ReactionRecord, UserRecord,
};

use crate::error::ScrapeError;
use crate::source::MessageBundle;

pub(crate) fn parse_id(s: &str) -> Result<u64, ScrapeError> {
    match s.parse() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ScrapeError::InvalidId(s.to_string())),
    }
}

/// Message-bearing channel kinds. Voice, stage, category, directory,
/// forum and media containers are excluded from scraping.
pub(crate) fn is_text_kind(kind: ChannelType) -> bool {
    matches!(
        kind,
        ChannelType::Text
            | ChannelType::News
            | ChannelType::PublicThread
            | ChannelType::PrivateThread
            | ChannelType::NewsThread
    )
}

pub(crate) fn channel_record(channel: &GuildChannel) -> ChannelRecord {
    ChannelRecord {
        id: channel.id.to_string(),
        guild_id: channel.guild_id.to_string(),
        name: channel.name.clone(),
        kind: i64::from(u8::from(channel.kind)),
        parent_id: channel.parent_id.map(|id| id.to_string()),
        position: Some(i64::from(channel.position)),
        topic: channel.topic.clone(),
        last_scraped_message_id: None,
        last_scraped_at: None,
        message_count: 0,
    }
}

pub(crate) fn user_record(user: &User) -> UserRecord {
    UserRecord {
        id: user.id.to_string(),
        username: user.name.clone(),
        global_name: user.global_name.clone(),
        discriminator: user
            .discriminator
            .map(|d| d.get().to_string())
            .unwrap_or_else(|| "0".to_string()),
        avatar_url: user.avatar_url(),
        is_bot: user.bot,
    }
}

pub(crate) fn bundle(msg: &Message) -> MessageBundle {
    let message_id = msg.id.to_string();
    MessageBundle {
        message: MessageRecord {
            id: message_id.clone(),
            channel_id: msg.channel_id.to_string(),
            author_id: msg.author.id.to_string(),
            content: msg.content.clone(),
            clean_content: clean_content(msg),
            timestamp: iso_utc(msg.timestamp),
            edited_timestamp: msg.edited_timestamp.map(iso_utc),
            message_type: i64::from(u8::from(msg.kind)),
            reference_id: msg
                .message_reference
                .as_ref()
                .and_then(|r| r.message_id)
                .map(|id| id.to_string()),
            thread_id: msg.thread.as_ref().map(|t| t.id.to_string()),
            has_embeds: !msg.embeds.is_empty(),
            has_attachments: !msg.attachments.is_empty(),
            reaction_count: msg.reactions.iter().map(|r| r.count as i64).sum(),
        },
        author: user_record(&msg.author),
        embeds: msg
            .embeds
            .iter()
            .map(|e| EmbedRecord {
                message_id: message_id.clone(),
                title: e.title.clone(),
                description: e.description.clone(),
                url: e.url.clone(),
            })
            .collect(),
        attachments: msg
            .attachments
            .iter()
            .map(|a| AttachmentRecord {
                id: a.id.to_string(),
                message_id: message_id.clone(),
                filename: a.filename.clone(),
                url: a.url.clone(),
                size: a.size as i64,
                content_type: a.content_type.clone(),
            })
            .collect(),
        reactions: msg
            .reactions
            .iter()
            .map(|r| ReactionRecord {
                message_id: message_id.clone(),
                emoji: r.reaction_type.to_string(),
                count: r.count as i64,
            })
            .collect(),
    }
}

/// Readable variant of the raw content: `<@id>` / `<@!id>` mention
/// markup resolved to `@name` via the message's mention list.
pub(crate) fn clean_content(msg: &Message) -> String {
    let mut out = msg.content.clone();
    for user in &msg.mentions {
        let display = user.global_name.as_deref().unwrap_or(&user.name);
        for pattern in [format!("<@{}>", user.id), format!("<@!{}>", user.id)] {
            if out.contains(&pattern) {
                out = out.replace(&pattern, &format!("@{display}"));
            }
        }
    }
    out
}

/// Uniform ISO-8601 UTC rendering. One fixed format keeps stored
/// timestamps comparable as strings.
fn iso_utc(ts: Timestamp) -> String {
    let nanos = ts.unix_timestamp_nanos();
    let secs = nanos.div_euclid(1_000_000_000) as i64;
    let subsec = nanos.rem_euclid(1_000_000_000) as u32;
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, subsec)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| ts.to_string())
}
