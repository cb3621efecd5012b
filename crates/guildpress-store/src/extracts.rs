use rusqlite::params;
use serde::Serialize;

use guildpress_core::types::{ExtractType, Sentiment};

use crate::error::{Result, StoreError};
use crate::Store;

/// Insert payload for one marketing extract. The table is append-only;
/// there is no natural key.
#[derive(Debug, Clone)]
pub struct NewExtract {
    pub source_type: String,
    pub source_id: String,
    pub extract_type: ExtractType,
    pub title: Option<String>,
    pub content: String,
    pub relevance_score: f64,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub requires_permission: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRow {
    pub id: i64,
    pub source_type: String,
    pub source_id: String,
    pub extract_type: ExtractType,
    pub title: Option<String>,
    pub content: String,
    pub formatted_content: Option<String>,
    pub relevance_score: f64,
    pub sentiment: String,
    pub topics: Vec<String>,
    pub requires_permission: bool,
    pub permission_granted: bool,
    pub created_at: String,
}

impl Store {
    pub fn insert_extract(&self, extract: &NewExtract) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO marketing_extracts
                 (source_type, source_id, extract_type, title, content,
                  relevance_score, sentiment, topics, requires_permission)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                extract.source_type,
                extract.source_id,
                extract.extract_type.to_string(),
                extract.title,
                extract.content,
                extract.relevance_score,
                extract.sentiment.to_string(),
                serde_json::to_string(&extract.topics)?,
                extract.requires_permission
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Extracts still waiting for channel-ready copy, oldest first.
    pub fn pending_format_extracts(&self, limit: i64) -> Result<Vec<ExtractRow>> {
        self.select_extracts(
            "WHERE formatted_content IS NULL ORDER BY id ASC LIMIT ?1",
            params![limit],
        )
    }

    pub fn set_formatted_content(&self, extract_id: i64, formatted: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE marketing_extracts SET formatted_content = ?2 WHERE id = ?1",
            params![extract_id, formatted],
        )?;
        Ok(())
    }

    pub fn list_extracts(
        &self,
        extract_type: Option<ExtractType>,
        limit: i64,
    ) -> Result<Vec<ExtractRow>> {
        match extract_type {
            Some(kind) => self.select_extracts(
                "WHERE extract_type = ?1 ORDER BY id DESC LIMIT ?2",
                params![kind.to_string(), limit],
            ),
            None => self.select_extracts("ORDER BY id DESC LIMIT ?1", params![limit]),
        }
    }

    /// Row counts per extract type, for `process status`.
    pub fn extract_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT extract_type, COUNT(*) FROM marketing_extracts
             GROUP BY extract_type ORDER BY extract_type",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn select_extracts<P: rusqlite::Params>(&self, tail: &str, params: P) -> Result<Vec<ExtractRow>> {
        let sql = format!(
            "SELECT id, source_type, source_id, extract_type, title, content,
                    formatted_content, relevance_score, sentiment, topics,
                    requires_permission, permission_granted, created_at
             FROM marketing_extracts {tail}"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let extract_type: String = row.get(3)?;
            let topics: String = row.get(9)?;
            out.push(ExtractRow {
                id: row.get(0)?,
                source_type: row.get(1)?,
                source_id: row.get(2)?,
                extract_type: extract_type
                    .parse()
                    .map_err(|e: String| StoreError::Corrupt(e))?,
                title: row.get(4)?,
                content: row.get(5)?,
                formatted_content: row.get(6)?,
                relevance_score: row.get(7)?,
                sentiment: row.get(8)?,
                topics: serde_json::from_str(&topics)?,
                requires_permission: row.get(10)?,
                permission_granted: row.get(11)?,
                created_at: row.get(12)?,
            });
        }
        Ok(out)
    }
}
