//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! A clinical guideline corpus is a few thousand chunks, which a full
//! scan handles comfortably.

use super::{rank_records, ChunkMetadata, ChunkRecord, SearchResult, SourceSummary, VectorStore};
use crate::error::{KneeRagError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        text TEXT NOT NULL,
        metadata_json TEXT NOT NULL,
        embedding BLOB NOT NULL,
        indexed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Open (or create) a SQLite vector store.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets a running `chat` read while `ingest` writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KneeRagError::RetrievalFailure(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    /// Insert or replace `records` inside an open transaction.
    fn insert_records(tx: &rusqlite::Transaction<'_>, records: &[ChunkRecord]) -> Result<()> {
        let mut stmt = tx.prepare_cached(
            r#"
            INSERT OR REPLACE INTO chunks
            (id, source, text, metadata_json, embedding, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )?;

        for record in records {
            let metadata_json = serde_json::to_string(&record.metadata)?;
            stmt.execute(params![
                record.id,
                record.metadata.source,
                record.text,
                metadata_json,
                Self::embedding_to_bytes(&record.embedding),
                record.indexed_at.to_rfc3339(),
            ])?;
        }
        Ok(())
    }

    /// Decode one row, surfacing malformed metadata instead of hiding it.
    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(ChunkRecord, Option<String>)> {
        let metadata_json: String = row.get(2)?;
        let embedding_bytes: Vec<u8> = row.get(3)?;
        let indexed_at_str: String = row.get(4)?;

        let (metadata, problem) = match serde_json::from_str::<ChunkMetadata>(&metadata_json) {
            Ok(meta) => (meta, None),
            Err(e) => (ChunkMetadata::default(), Some(e.to_string())),
        };

        let record = ChunkRecord {
            id: row.get(0)?,
            text: row.get(1)?,
            metadata,
            embedding: Self::bytes_to_embedding(&embedding_bytes),
            indexed_at: DateTime::parse_from_rfc3339(&indexed_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        };
        Ok((record, problem))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        Self::insert_records(&tx, records)?;
        tx.commit()?;

        debug!("Upserted {} chunks", records.len());
        Ok(records.len())
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn replace_source(&self, source: &str, records: &[ChunkRecord]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let removed = tx.execute("DELETE FROM chunks WHERE source = ?1", params![source])?;
        Self::insert_records(&tx, records)?;
        tx.commit()?;

        debug!("Replaced {} chunks of {} with {}", removed, source, records.len());
        Ok(records.len())
    }

    #[instrument(skip(self, embedding))]
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, text, metadata_json, embedding, indexed_at FROM chunks ORDER BY rowid",
        )?;

        let mut records = Vec::new();
        for row in stmt.query_map([], Self::row_to_record)? {
            let (record, problem) = row?;
            if let Some(problem) = problem {
                return Err(KneeRagError::RetrievalFailure(format!(
                    "malformed metadata for chunk {}: {}",
                    record.id, problem
                )));
            }
            records.push(record);
        }

        let results = rank_records(records, embedding, k)?;
        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM chunks WHERE source = ?1", params![source])?;
        debug!("Deleted {} chunks for source {}", deleted, source);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT source, COUNT(*) AS chunk_count, MAX(indexed_at) AS indexed_at
            FROM chunks
            GROUP BY source
            ORDER BY indexed_at DESC, source ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let indexed_at_str: String = row.get(2)?;
            Ok(SourceSummary {
                source: row.get(0)?,
                chunk_count: row.get(1)?,
                indexed_at: DateTime::parse_from_rfc3339(&indexed_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
