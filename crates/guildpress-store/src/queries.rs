use chrono::NaiveDate;
use rusqlite::params_from_iter;
use serde_json::Value;

use guildpress_core::types::{
    AttachmentRecord, ChannelRecord, EmbedRecord, GuildRecord, MessageRecord, ReactionRecord,
    Stage, UserRecord,
};

use crate::error::Result;
use crate::Store;

/// Optional bounds shared by the selection queries.
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub channel_id: Option<String>,
    /// Inclusive ISO-8601 lower bound on `timestamp`.
    pub since: Option<String>,
    /// Inclusive ISO-8601 upper bound on `timestamp`.
    pub until: Option<String>,
    pub limit: Option<i64>,
}

/// A message joined to its author row, the shape every pipeline stage
/// consumes.
#[derive(Debug, Clone)]
pub struct MessageWithAuthor {
    pub message: MessageRecord,
    pub author: UserRecord,
}

const MESSAGE_COLS: &str = "m.id, m.channel_id, m.author_id, m.content, m.clean_content, \
     m.timestamp, m.edited_timestamp, m.message_type, m.reference_id, m.thread_id, \
     m.has_embeds, m.has_attachments, m.reaction_count";
const USER_COLS: &str = "u.id, u.username, u.global_name, u.discriminator, u.avatar_url, u.is_bot";

fn message_from_row(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(base)?,
        channel_id: row.get(base + 1)?,
        author_id: row.get(base + 2)?,
        content: row.get(base + 3)?,
        clean_content: row.get(base + 4)?,
        timestamp: row.get(base + 5)?,
        edited_timestamp: row.get(base + 6)?,
        message_type: row.get(base + 7)?,
        reference_id: row.get(base + 8)?,
        thread_id: row.get(base + 9)?,
        has_embeds: row.get(base + 10)?,
        has_attachments: row.get(base + 11)?,
        reaction_count: row.get(base + 12)?,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(base)?,
        username: row.get(base + 1)?,
        global_name: row.get(base + 2)?,
        discriminator: row.get(base + 3)?,
        avatar_url: row.get(base + 4)?,
        is_bot: row.get(base + 5)?,
    })
}

fn with_author(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageWithAuthor> {
    Ok(MessageWithAuthor {
        message: message_from_row(row, 0)?,
        author: user_from_row(row, 13)?,
    })
}

fn guild_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GuildRecord> {
    Ok(GuildRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        icon_url: row.get(2)?,
        member_count: row.get(3)?,
    })
}

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRecord> {
    Ok(ChannelRecord {
        id: row.get(0)?,
        guild_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        parent_id: row.get(4)?,
        position: row.get(5)?,
        topic: row.get(6)?,
        last_scraped_message_id: row.get(7)?,
        last_scraped_at: row.get(8)?,
        message_count: row.get(9)?,
    })
}

const CHANNEL_COLS: &str = "c.id, c.guild_id, c.name, c.type, c.parent_id, c.position, c.topic, \
     c.last_scraped_message_id, c.last_scraped_at, c.message_count";

/// Half-open UTC day bounds usable for lexicographic comparison against
/// stored ISO-8601 timestamps.
pub(crate) fn day_bounds(date: NaiveDate) -> (String, String) {
    let next = date.succ_opt().unwrap_or(date);
    (format!("{date}T00:00:00"), format!("{next}T00:00:00"))
}

impl Store {
    /// Messages with no memoized row for `stage`, oldest first.
    pub fn unprocessed_messages(
        &self,
        stage: Stage,
        query: &MessageQuery,
    ) -> Result<Vec<MessageWithAuthor>> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLS}, {USER_COLS}
             FROM messages m
             JOIN users u ON u.id = m.author_id
             LEFT JOIN ai_processing a
                 ON a.entity_type = 'message' AND a.entity_id = m.id AND a.stage = ?
             WHERE a.id IS NULL"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(stage.to_string())];
        push_bounds(&mut sql, &mut params, query);
        sql.push_str(" ORDER BY m.timestamp ASC");
        push_limit(&mut sql, &mut params, query.limit);

        self.select_with_author(&sql, &params)
    }

    /// Messages joined to their memoized `stage` row. With `keep_only`,
    /// the keep predicate is applied in the WHERE clause, after the join.
    pub fn processed_messages(
        &self,
        stage: Stage,
        keep_only: bool,
        limit: Option<i64>,
    ) -> Result<Vec<(MessageWithAuthor, Value)>> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLS}, {USER_COLS}, a.result_json
             FROM messages m
             JOIN users u ON u.id = m.author_id
             JOIN ai_processing a
                 ON a.entity_type = 'message' AND a.entity_id = m.id AND a.stage = ?"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(stage.to_string())];
        if keep_only {
            sql.push_str(" WHERE json_extract(a.result_json, '$.keep') = 1");
        }
        sql.push_str(" ORDER BY m.timestamp ASC");
        push_limit(&mut sql, &mut params, limit);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter().map(|p| p.as_ref())))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(19)?;
            out.push((with_author(row)?, serde_json::from_str(&raw)?));
        }
        Ok(out)
    }

    /// Channels that have at least one filter-kept message on the given
    /// UTC day. Drives the daily summarize fan-out.
    pub fn channels_with_kept_messages(&self, date: NaiveDate) -> Result<Vec<ChannelRecord>> {
        let (start, end) = day_bounds(date);
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT DISTINCT {CHANNEL_COLS}
             FROM channels c
             JOIN messages m ON m.channel_id = c.id
             JOIN ai_processing a
                 ON a.entity_type = 'message' AND a.entity_id = m.id AND a.stage = 'filter'
             WHERE json_extract(a.result_json, '$.keep') = 1
               AND m.timestamp >= ?1 AND m.timestamp < ?2
             ORDER BY c.position, c.id"
        ))?;
        let rows = stmt.query_map(rusqlite::params![start, end], channel_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Filter-kept messages for one channel on one UTC day, oldest first.
    pub fn kept_messages_for_day(
        &self,
        channel_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<MessageWithAuthor>> {
        let (start, end) = day_bounds(date);
        let sql = format!(
            "SELECT {MESSAGE_COLS}, {USER_COLS}
             FROM messages m
             JOIN users u ON u.id = m.author_id
             JOIN ai_processing a
                 ON a.entity_type = 'message' AND a.entity_id = m.id AND a.stage = 'filter'
             WHERE json_extract(a.result_json, '$.keep') = 1
               AND m.channel_id = ?1
               AND m.timestamp >= ?2 AND m.timestamp < ?3
             ORDER BY m.timestamp ASC"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(rusqlite::params![channel_id, start, end], with_author)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Filter-kept messages that have no memoized row for `stage` yet,
    /// oldest first. The categorize selection.
    pub fn kept_unprocessed_messages(
        &self,
        stage: Stage,
        query: &MessageQuery,
    ) -> Result<Vec<MessageWithAuthor>> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLS}, {USER_COLS}
             FROM messages m
             JOIN users u ON u.id = m.author_id
             JOIN ai_processing f
                 ON f.entity_type = 'message' AND f.entity_id = m.id AND f.stage = 'filter'
             LEFT JOIN ai_processing a
                 ON a.entity_type = 'message' AND a.entity_id = m.id AND a.stage = ?
             WHERE json_extract(f.result_json, '$.keep') = 1
               AND a.id IS NULL"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(stage.to_string())];
        push_bounds(&mut sql, &mut params, query);
        sql.push_str(" ORDER BY m.timestamp ASC");
        push_limit(&mut sql, &mut params, query.limit);
        self.select_with_author(&sql, &params)
    }

    /// Extract-stage candidates: filter-kept, high or medium marketing
    /// relevance (or not yet categorized), newest first. Messages that
    /// already have an extract memoization row are excluded unless
    /// `include_extracted` (the force path) is set.
    pub fn extract_candidates(
        &self,
        limit: i64,
        include_extracted: bool,
    ) -> Result<Vec<MessageWithAuthor>> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLS}, {USER_COLS}
             FROM messages m
             JOIN users u ON u.id = m.author_id
             JOIN ai_processing f
                 ON f.entity_type = 'message' AND f.entity_id = m.id AND f.stage = 'filter'
             LEFT JOIN ai_processing c
                 ON c.entity_type = 'message' AND c.entity_id = m.id AND c.stage = 'categorize'
             LEFT JOIN ai_processing e
                 ON e.entity_type = 'message' AND e.entity_id = m.id AND e.stage = 'extract'
             WHERE json_extract(f.result_json, '$.keep') = 1
               AND (c.id IS NULL
                    OR json_extract(c.result_json, '$.marketing_relevance') IN ('high', 'medium'))"
        );
        if !include_extracted {
            sql.push_str(" AND e.id IS NULL");
        }
        sql.push_str(" ORDER BY m.timestamp DESC LIMIT ?");
        let params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(limit)];
        self.select_with_author(&sql, &params)
    }

    /// Raw message export query, oldest first.
    pub fn messages_in_range(&self, query: &MessageQuery) -> Result<Vec<MessageWithAuthor>> {
        let mut sql = format!(
            "SELECT {MESSAGE_COLS}, {USER_COLS}
             FROM messages m
             JOIN users u ON u.id = m.author_id
             WHERE 1 = 1"
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        push_bounds(&mut sql, &mut params, query);
        sql.push_str(" ORDER BY m.timestamp ASC");
        push_limit(&mut sql, &mut params, query.limit);
        self.select_with_author(&sql, &params)
    }

    pub fn get_guild(&self, guild_id: &str) -> Result<Option<GuildRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, icon_url, member_count FROM guilds WHERE id = ?1",
        )?;
        let mut rows = stmt.query([guild_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(guild_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// The scraped guild. The store holds one guild per deployment;
    /// this returns it without the caller needing the id.
    pub fn first_guild(&self) -> Result<Option<GuildRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, icon_url, member_count FROM guilds ORDER BY id LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(guild_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn all_channels(&self) -> Result<Vec<ChannelRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CHANNEL_COLS} FROM channels c ORDER BY c.position, c.id"
        ))?;
        let rows = stmt.query_map([], channel_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {CHANNEL_COLS} FROM channels c WHERE c.id = ?1"
        ))?;
        let mut rows = stmt.query([channel_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(channel_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Child rows for one message, used by the exporters.
    pub fn message_children(
        &self,
        message_id: &str,
    ) -> Result<(Vec<EmbedRecord>, Vec<AttachmentRecord>, Vec<ReactionRecord>)> {
        let conn = self.conn();

        let mut stmt = conn.prepare_cached(
            "SELECT message_id, title, description, url FROM embeds WHERE message_id = ?1",
        )?;
        let embeds = stmt
            .query_map([message_id], |row| {
                Ok(EmbedRecord {
                    message_id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    url: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT id, message_id, filename, url, size, content_type
             FROM attachments WHERE message_id = ?1",
        )?;
        let attachments = stmt
            .query_map([message_id], |row| {
                Ok(AttachmentRecord {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    filename: row.get(2)?,
                    url: row.get(3)?,
                    size: row.get(4)?,
                    content_type: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare_cached(
            "SELECT message_id, emoji, count FROM reactions WHERE message_id = ?1",
        )?;
        let reactions = stmt
            .query_map([message_id], |row| {
                Ok(ReactionRecord {
                    message_id: row.get(0)?,
                    emoji: row.get(1)?,
                    count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((embeds, attachments, reactions))
    }

    fn select_with_author(
        &self,
        sql: &str,
        params: &[Box<dyn rusqlite::ToSql>],
    ) -> Result<Vec<MessageWithAuthor>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(
            params_from_iter(params.iter().map(|p| p.as_ref())),
            with_author,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn push_bounds(sql: &mut String, params: &mut Vec<Box<dyn rusqlite::ToSql>>, query: &MessageQuery) {
    if let Some(channel_id) = &query.channel_id {
        sql.push_str(" AND m.channel_id = ?");
        params.push(Box::new(channel_id.clone()));
    }
    if let Some(since) = &query.since {
        sql.push_str(" AND m.timestamp >= ?");
        params.push(Box::new(since.clone()));
    }
    if let Some(until) = &query.until {
        sql.push_str(" AND m.timestamp <= ?");
        params.push(Box::new(until.clone()));
    }
}

fn push_limit(sql: &mut String, params: &mut Vec<Box<dyn rusqlite::ToSql>>, limit: Option<i64>) {
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(Box::new(limit));
    }
}
