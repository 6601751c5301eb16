//! In-memory vector store implementation.
//!
//! Useful for testing and small corpora.

use super::{rank_records, ChunkRecord, SearchResult, SourceSummary, VectorStore};
use crate::error::{KneeRagError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory vector store. Keeps insertion order for stable tie-breaking.
pub struct MemoryVectorStore {
    records: RwLock<Vec<ChunkRecord>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> KneeRagError {
    KneeRagError::RetrievalFailure(format!("Failed to acquire lock: {}", e))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
        let mut store = self.records.write().map_err(poisoned)?;
        for record in records {
            match store.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => store.push(record.clone()),
            }
        }
        Ok(records.len())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let store = self.records.read().map_err(poisoned)?;
        rank_records(store.iter().cloned(), embedding, k)
    }

    async fn replace_source(&self, source: &str, records: &[ChunkRecord]) -> Result<usize> {
        let mut store = self.records.write().map_err(poisoned)?;
        store.retain(|r| r.metadata.source != source);
        store.extend(records.iter().cloned());
        Ok(records.len())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut store = self.records.write().map_err(poisoned)?;
        let initial_len = store.len();
        store.retain(|r| r.metadata.source != source);
        Ok(initial_len - store.len())
    }

    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let store = self.records.read().map_err(poisoned)?;

        let mut source_map: HashMap<String, SourceSummary> = HashMap::new();
        for record in store.iter() {
            let entry = source_map
                .entry(record.metadata.source.clone())
                .or_insert_with(|| SourceSummary {
                    source: record.metadata.source.clone(),
                    chunk_count: 0,
                    indexed_at: record.indexed_at,
                });

            entry.chunk_count += 1;
            if record.indexed_at > entry.indexed_at {
                entry.indexed_at = record.indexed_at;
            }
        }

        let mut sources: Vec<SourceSummary> = source_map.into_values().collect();
        sources.sort_by(|a, b| b.indexed_at.cmp(&a.indexed_at).then_with(|| a.source.cmp(&b.source)));
        Ok(sources)
    }

    async fn count(&self) -> Result<usize> {
        let store = self.records.read().map_err(poisoned)?;
        Ok(store.len())
    }
}
