use rusqlite::params;

use guildpress_core::types::{SyncState, SyncType};

use crate::error::{Result, StoreError};
use crate::Store;

impl Store {
    /// Open a sync row in `in_progress` and return its id.
    pub fn begin_sync(
        &self,
        sync_type: SyncType,
        guild_id: Option<&str>,
        channel_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_state (sync_type, guild_id, channel_id, status)
             VALUES (?1, ?2, ?3, 'in_progress')",
            params![sync_type.to_string(), guild_id, channel_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Terminal transition: completed with the processed total.
    pub fn complete_sync(&self, sync_id: i64, messages_processed: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE sync_state SET
                 status = 'completed',
                 completed_at = datetime('now'),
                 messages_processed = ?2
             WHERE id = ?1 AND status = 'in_progress'",
            params![sync_id, messages_processed],
        )?;
        Ok(())
    }

    /// Terminal transition: failed with a reason.
    pub fn fail_sync(&self, sync_id: i64, error: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sync_state SET
                 status = 'failed',
                 completed_at = datetime('now'),
                 error_message = ?2
             WHERE id = ?1 AND status = 'in_progress'",
            params![sync_id, error],
        )?;
        Ok(())
    }

    pub fn get_sync(&self, sync_id: i64) -> Result<Option<SyncState>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, sync_type, guild_id, channel_id, started_at, completed_at,
                    messages_processed, status, error_message
             FROM sync_state WHERE id = ?1",
        )?;
        let mut rows = stmt.query([sync_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_sync(row)?)),
            None => Ok(None),
        }
    }

    /// Most recent sync row, for `db stats` and `process status`.
    pub fn last_sync(&self) -> Result<Option<SyncState>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, sync_type, guild_id, channel_id, started_at, completed_at,
                    messages_processed, status, error_message
             FROM sync_state ORDER BY id DESC LIMIT 1",
        )?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_sync(row)?)),
            None => Ok(None),
        }
    }
}

fn row_to_sync(row: &rusqlite::Row<'_>) -> Result<SyncState> {
    let sync_type: String = row.get(1)?;
    let status: String = row.get(7)?;
    Ok(SyncState {
        id: row.get(0)?,
        sync_type: sync_type
            .parse()
            .map_err(|e: String| StoreError::Corrupt(e))?,
        guild_id: row.get(2)?,
        channel_id: row.get(3)?,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        messages_processed: row.get(6)?,
        status: status.parse().map_err(|e: String| StoreError::Corrupt(e))?,
        error_message: row.get(8)?,
    })
}
