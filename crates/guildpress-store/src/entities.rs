use rusqlite::params;

use guildpress_core::types::{
    AttachmentRecord, ChannelRecord, EmbedRecord, GuildRecord, MessageRecord, ReactionRecord,
    UserRecord,
};

use crate::error::Result;
use crate::Store;

impl Store {
    /// Insert or refresh a guild. Mutable fields only on conflict.
    pub fn upsert_guild(&self, guild: &GuildRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO guilds (id, name, icon_url, member_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 icon_url = excluded.icon_url,
                 member_count = excluded.member_count,
                 updated_at = datetime('now')",
            params![guild.id, guild.name, guild.icon_url, guild.member_count],
        )?;
        Ok(())
    }

    /// Insert or refresh a channel. The scrape cursor columns are owned
    /// by `update_channel_last_scraped` and never touched here.
    pub fn upsert_channel(&self, channel: &ChannelRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO channels (id, guild_id, name, type, parent_id, position, topic)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 type = excluded.type,
                 parent_id = excluded.parent_id,
                 position = excluded.position,
                 topic = excluded.topic",
            params![
                channel.id,
                channel.guild_id,
                channel.name,
                channel.kind,
                channel.parent_id,
                channel.position,
                channel.topic
            ],
        )?;
        Ok(())
    }

    pub fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, global_name, discriminator, avatar_url, is_bot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 global_name = excluded.global_name,
                 discriminator = excluded.discriminator,
                 avatar_url = excluded.avatar_url,
                 is_bot = excluded.is_bot",
            params![
                user.id,
                user.username,
                user.global_name,
                user.discriminator,
                user.avatar_url,
                user.is_bot
            ],
        )?;
        Ok(())
    }

    /// Insert a message, or refresh the content of an edited one.
    /// `timestamp` is written once and never rewritten.
    pub fn upsert_message(&self, message: &MessageRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, channel_id, author_id, content, clean_content,
                                   timestamp, edited_timestamp, message_type, reference_id,
                                   thread_id, has_embeds, has_attachments, reaction_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 content = excluded.content,
                 clean_content = excluded.clean_content,
                 edited_timestamp = excluded.edited_timestamp,
                 has_embeds = excluded.has_embeds,
                 has_attachments = excluded.has_attachments,
                 reaction_count = excluded.reaction_count",
            params![
                message.id,
                message.channel_id,
                message.author_id,
                message.content,
                message.clean_content,
                message.timestamp,
                message.edited_timestamp,
                message.message_type,
                message.reference_id,
                message.thread_id,
                message.has_embeds,
                message.has_attachments,
                message.reaction_count
            ],
        )?;
        Ok(())
    }

    /// Replace the embed rows for a message with the given set.
    pub fn replace_embeds(&self, message_id: &str, embeds: &[EmbedRecord]) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM embeds WHERE message_id = ?1", [message_id])?;
        let mut stmt = conn.prepare_cached(
            "INSERT INTO embeds (message_id, title, description, url) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for embed in embeds {
            stmt.execute(params![message_id, embed.title, embed.description, embed.url])?;
        }
        Ok(())
    }

    pub fn upsert_attachment(&self, attachment: &AttachmentRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO attachments (id, message_id, filename, url, size, content_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 filename = excluded.filename,
                 url = excluded.url,
                 size = excluded.size,
                 content_type = excluded.content_type",
            params![
                attachment.id,
                attachment.message_id,
                attachment.filename,
                attachment.url,
                attachment.size,
                attachment.content_type
            ],
        )?;
        Ok(())
    }

    /// Reaction rows are unique per (message, emoji); re-encountering
    /// one refreshes its count.
    pub fn upsert_reaction(&self, reaction: &ReactionRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO reactions (message_id, emoji, count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id, emoji) DO UPDATE SET count = excluded.count",
            params![reaction.message_id, reaction.emoji, reaction.count],
        )?;
        Ok(())
    }

    /// Advance the channel resume cursor. Called only after a channel
    /// scrape completes, so a crash mid-channel re-fetches from the
    /// previous watermark.
    pub fn update_channel_last_scraped(&self, channel_id: &str, message_id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE channels SET
                 last_scraped_message_id = ?2,
                 last_scraped_at = datetime('now'),
                 message_count = (SELECT COUNT(*) FROM messages WHERE channel_id = ?1)
             WHERE id = ?1",
            params![channel_id, message_id],
        )?;
        Ok(())
    }

    /// Remove a channel and, via cascade, its messages and their children.
    pub fn delete_channel(&self, channel_id: &str) -> Result<usize> {
        Ok(self
            .conn()
            .execute("DELETE FROM channels WHERE id = ?1", [channel_id])?)
    }
}
