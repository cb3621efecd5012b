//! Fixture builders shared by this crate's tests.

use guildpress_core::types::{ChannelRecord, GuildRecord, MessageRecord, UserRecord};

pub(crate) fn guild(id: &str) -> GuildRecord {
    GuildRecord {
        id: id.into(),
        name: format!("guild-{id}"),
        icon_url: None,
        member_count: Some(42),
    }
}

pub(crate) fn channel(id: &str, guild_id: &str) -> ChannelRecord {
    ChannelRecord {
        id: id.into(),
        guild_id: guild_id.into(),
        name: format!("chan-{id}"),
        kind: 0,
        parent_id: None,
        position: Some(0),
        topic: None,
        last_scraped_message_id: None,
        last_scraped_at: None,
        message_count: 0,
    }
}

pub(crate) fn user(id: &str, name: &str) -> UserRecord {
    UserRecord {
        id: id.into(),
        username: name.into(),
        global_name: None,
        discriminator: "0".into(),
        avatar_url: None,
        is_bot: false,
    }
}

pub(crate) fn message(id: &str, channel_id: &str, author_id: &str, ts: &str) -> MessageRecord {
    MessageRecord {
        id: id.into(),
        channel_id: channel_id.into(),
        author_id: author_id.into(),
        content: format!("message {id}"),
        clean_content: format!("message {id}"),
        timestamp: ts.into(),
        edited_timestamp: None,
        message_type: 0,
        reference_id: None,
        thread_id: None,
        has_embeds: false,
        has_attachments: false,
        reaction_count: 0,
    }
}
