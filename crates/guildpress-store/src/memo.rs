use chrono::NaiveDateTime;
use rusqlite::params;
use serde_json::Value;

use guildpress_core::types::{EntityType, Stage};

use crate::error::{Result, StoreError};
use crate::Store;

/// Payload for one memoized stage result.
#[derive(Debug, Clone)]
pub struct StageResultWrite<'a> {
    pub entity_type: EntityType,
    pub entity_id: &'a str,
    pub stage: Stage,
    pub result: &'a Value,
    pub model_used: &'a str,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
}

/// A memoized stage result read back from the store.
#[derive(Debug, Clone)]
pub struct StoredStageResult {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub stage: Stage,
    pub result: Value,
    pub model_used: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    /// `datetime('now')` at write time, UTC.
    pub processed_at: String,
}

impl Store {
    /// Write a stage result. Same (entity_type, entity_id, stage)
    /// replaces the prior row; last write wins.
    pub fn record_stage_result(&self, write: &StageResultWrite<'_>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO ai_processing
                 (entity_type, entity_id, stage, result_json, model_used, tokens_in, tokens_out)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(entity_type, entity_id, stage) DO UPDATE SET
                 result_json = excluded.result_json,
                 model_used = excluded.model_used,
                 tokens_in = excluded.tokens_in,
                 tokens_out = excluded.tokens_out,
                 processed_at = datetime('now')",
            params![
                write.entity_type.to_string(),
                write.entity_id,
                write.stage.to_string(),
                write.result.to_string(),
                write.model_used,
                write.tokens_in,
                write.tokens_out
            ],
        )?;
        Ok(())
    }

    pub fn get_stage_result(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        stage: Stage,
    ) -> Result<Option<StoredStageResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT entity_type, entity_id, stage, result_json, model_used,
                    tokens_in, tokens_out, processed_at
             FROM ai_processing
             WHERE entity_type = ?1 AND entity_id = ?2 AND stage = ?3",
        )?;
        let mut rows = stmt.query(params![
            entity_type.to_string(),
            entity_id,
            stage.to_string()
        ])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_stored(row)?)),
            None => Ok(None),
        }
    }

    /// The idempotence gate: true when no result exists, the existing
    /// one has aged past `reprocess_after_days`, or `force` is set.
    pub fn should_process(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        stage: Stage,
        force: bool,
        reprocess_after_days: Option<u32>,
    ) -> Result<bool> {
        if force {
            return Ok(true);
        }
        let processed_at: Option<String> = self
            .conn()
            .query_row(
                "SELECT processed_at FROM ai_processing
                 WHERE entity_type = ?1 AND entity_id = ?2 AND stage = ?3",
                params![entity_type.to_string(), entity_id, stage.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(processed_at) = processed_at else {
            return Ok(true);
        };
        let Some(days) = reprocess_after_days else {
            return Ok(false);
        };

        let when = NaiveDateTime::parse_from_str(&processed_at, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| StoreError::Corrupt(format!("bad processed_at {processed_at:?}: {e}")))?;
        let age = chrono::Utc::now().naive_utc() - when;
        Ok(age.num_days() >= i64::from(days))
    }

    /// All memoized results for one (entity_type, stage) pair.
    pub fn stage_results(
        &self,
        entity_type: EntityType,
        stage: Stage,
    ) -> Result<Vec<StoredStageResult>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT entity_type, entity_id, stage, result_json, model_used,
                    tokens_in, tokens_out, processed_at
             FROM ai_processing
             WHERE entity_type = ?1 AND stage = ?2
             ORDER BY entity_id",
        )?;
        let mut rows = stmt.query(params![entity_type.to_string(), stage.to_string()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_stored(row)?);
        }
        Ok(out)
    }

    /// Drop every memoized row for a stage. Returns the number removed.
    pub fn delete_stage_results(&self, stage: Stage) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM ai_processing WHERE stage = ?1",
            [stage.to_string()],
        )?)
    }

    /// Row counts per stage, for `process status`.
    pub fn stage_counts(&self) -> Result<Vec<(Stage, i64)>> {
        let mut out = Vec::new();
        for stage in Stage::ALL {
            let count: i64 = self.conn().query_row(
                "SELECT COUNT(*) FROM ai_processing WHERE stage = ?1",
                [stage.to_string()],
                |row| row.get(0),
            )?;
            out.push((stage, count));
        }
        Ok(out)
    }
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> Result<StoredStageResult> {
    let entity_type: String = row.get(0)?;
    let stage: String = row.get(2)?;
    let result_json: String = row.get(3)?;
    Ok(StoredStageResult {
        entity_type: entity_type
            .parse()
            .map_err(|e: String| StoreError::Corrupt(e))?,
        entity_id: row.get(1)?,
        stage: stage.parse().map_err(|e: String| StoreError::Corrupt(e))?,
        result: serde_json::from_str(&result_json)?,
        model_used: row.get(4)?,
        tokens_in: row.get(5)?,
        tokens_out: row.get(6)?,
        processed_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(store: &Store, entity_id: &str, stage: Stage, result: Value) {
        store
            .record_stage_result(&StageResultWrite {
                entity_type: EntityType::Message,
                entity_id,
                stage,
                result: &result,
                model_used: "test-model",
                tokens_in: Some(10),
                tokens_out: Some(5),
            })
            .unwrap();
    }

    #[test]
    fn same_key_replaces() {
        let store = Store::open_in_memory().unwrap();
        write(&store, "m1", Stage::Filter, serde_json::json!({"keep": true}));
        write(&store, "m1", Stage::Filter, serde_json::json!({"keep": false}));

        let stored = store
            .get_stage_result(EntityType::Message, "m1", Stage::Filter)
            .unwrap()
            .unwrap();
        assert_eq!(stored.result["keep"], serde_json::json!(false));

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM ai_processing", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn should_process_gates_on_presence_and_force() {
        let store = Store::open_in_memory().unwrap();
        assert!(store
            .should_process(EntityType::Message, "m1", Stage::Filter, false, None)
            .unwrap());

        write(&store, "m1", Stage::Filter, serde_json::json!({"keep": true}));
        assert!(!store
            .should_process(EntityType::Message, "m1", Stage::Filter, false, None)
            .unwrap());
        assert!(store
            .should_process(EntityType::Message, "m1", Stage::Filter, true, None)
            .unwrap());
        // A fresh row is not yet older than any positive age budget.
        assert!(!store
            .should_process(EntityType::Message, "m1", Stage::Filter, false, Some(7))
            .unwrap());
    }

    #[test]
    fn age_expiry_triggers_reprocess() {
        let store = Store::open_in_memory().unwrap();
        write(&store, "m1", Stage::Filter, serde_json::json!({"keep": true}));
        store
            .conn()
            .execute(
                "UPDATE ai_processing SET processed_at = datetime('now', '-10 days')",
                [],
            )
            .unwrap();
        assert!(store
            .should_process(EntityType::Message, "m1", Stage::Filter, false, Some(7))
            .unwrap());
        assert!(!store
            .should_process(EntityType::Message, "m1", Stage::Filter, false, Some(30))
            .unwrap());
    }

    #[test]
    fn reset_removes_only_that_stage() {
        let store = Store::open_in_memory().unwrap();
        write(&store, "m1", Stage::Filter, serde_json::json!({"keep": true}));
        write(&store, "m1", Stage::Categorize, serde_json::json!({"primary_topic": "x"}));

        assert_eq!(store.delete_stage_results(Stage::Filter).unwrap(), 1);
        assert!(store
            .get_stage_result(EntityType::Message, "m1", Stage::Filter)
            .unwrap()
            .is_none());
        assert!(store
            .get_stage_result(EntityType::Message, "m1", Stage::Categorize)
            .unwrap()
            .is_some());
    }
}
