use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, StoreError};

/// Embedded migrations. Filenames sorted lexicographically define the
/// application order; each runs once, tracked in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_initial_schema.sql",
        include_str!("../migrations/0001_initial_schema.sql"),
    ),
    (
        "0002_sync_state.sql",
        include_str!("../migrations/0002_sync_state.sql"),
    ),
    (
        "0003_ai_processing.sql",
        include_str!("../migrations/0003_ai_processing.sql"),
    ),
];

pub(crate) fn apply_migrations(conn: &mut Connection) -> Result<usize> {
    debug_assert!(MIGRATIONS.windows(2).all(|w| w[0].0 < w[1].0));

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name       TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let mut applied = 0;
    for (name, sql) in MIGRATIONS {
        let done: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM _migrations WHERE name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if done {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(sql).map_err(|e| StoreError::Migration {
            name: name.to_string(),
            source: e,
        })?;
        tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
        tx.commit()?;
        debug!(migration = %name, "applied");
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn migrations_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        // First open creates the file and applies everything.
        let store = Store::open(&path).unwrap();
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, super::MIGRATIONS.len());
        drop(store);

        // Second open is a no-op.
        let store = Store::open(&path).unwrap();
        let count2: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, count2);
    }

    #[test]
    fn foreign_keys_enforced() {
        let store = Store::open_in_memory().unwrap();
        let res = store.conn().execute(
            "INSERT INTO messages (id, channel_id, author_id, timestamp)
             VALUES ('1', 'missing', 'missing', '2024-01-01T00:00:00Z')",
            [],
        );
        assert!(res.is_err());
    }
}
