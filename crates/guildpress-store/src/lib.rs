//! Embedded SQLite persistence for guildpress.
//!
//! One file database holds the raw Discord entities, scraper sync
//! bookkeeping, memoized stage results, and marketing extracts.
//! All writes go through a single `Mutex<Connection>`; WAL mode keeps
//! readers cheap while the scraper or pipeline is writing.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

mod db;
mod entities;
pub mod error;
mod extracts;
mod memo;
mod queries;
mod stats;
mod sync;
#[cfg(test)]
pub(crate) mod test_support;

pub use error::StoreError;
pub use extracts::{ExtractRow, NewExtract};
pub use memo::{StageResultWrite, StoredStageResult};
pub use queries::{MessageQuery, MessageWithAuthor};
pub use stats::StoreStats;

pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if absent) the database at `path` and bring the
    /// schema up to date. Parent directories are created. Safe to call
    /// from multiple processes; each migration is applied exactly once.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )?;
        let applied = db::apply_migrations(&mut conn)?;
        if applied > 0 {
            tracing::info!(applied, "database migrations applied");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// File path, when file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}
