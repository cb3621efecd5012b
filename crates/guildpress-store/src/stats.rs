use serde::Serialize;

use crate::error::Result;
use crate::Store;

/// Operator-facing snapshot of the store, printed by `db stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub guilds: i64,
    pub channels: i64,
    pub users: i64,
    pub messages: i64,
    pub embeds: i64,
    pub attachments: i64,
    pub reactions: i64,
    pub sync_runs: i64,
    pub stage_results: i64,
    pub extracts: i64,
    pub oldest_message: Option<String>,
    pub newest_message: Option<String>,
    pub file_size_bytes: Option<u64>,
}

impl Store {
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn()
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
        };

        let (oldest, newest): (Option<String>, Option<String>) = self.conn().query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM messages",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let file_size_bytes = self
            .path()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len());

        Ok(StoreStats {
            guilds: count("guilds")?,
            channels: count("channels")?,
            users: count("users")?,
            messages: count("messages")?,
            embeds: count("embeds")?,
            attachments: count("attachments")?,
            reactions: count("reactions")?,
            sync_runs: count("sync_state")?,
            stage_results: count("ai_processing")?,
            extracts: count("marketing_extracts")?,
            oldest_message: oldest,
            newest_message: newest,
            file_size_bytes,
        })
    }
}
