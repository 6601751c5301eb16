//! Vector store abstraction for kneerag.
//!
//! Provides a trait-based interface for different vector index backends.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::error::{KneeRagError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata attached to an indexed chunk.
///
/// Page-numbered corpora carry `page`, plain-text corpora carry
/// `chunk_index`. Neither is guaranteed. Unknown keys survive a round trip
/// through the store in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin document identifier (file name).
    #[serde(default)]
    pub source: String,
    /// 1-based page number within the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Position of the chunk within its source (or page).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    /// Metadata for a page-numbered chunk.
    pub fn paged(source: impl Into<String>, page: u32, chunk_index: u32) -> Self {
        Self {
            source: source.into(),
            page: Some(page),
            chunk_index: Some(chunk_index),
            extra: BTreeMap::new(),
        }
    }

    /// Metadata for a chunk of a plain-text document.
    pub fn indexed(source: impl Into<String>, chunk_index: u32) -> Self {
        Self {
            source: source.into(),
            page: None,
            chunk_index: Some(chunk_index),
            extra: BTreeMap::new(),
        }
    }

    /// Source name for display, `unknown` when missing.
    pub fn source_label(&self) -> &str {
        if self.source.trim().is_empty() {
            "unknown"
        } else {
            &self.source
        }
    }

    /// Page number for display, `?` when missing.
    pub fn page_label(&self) -> String {
        self.page.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string())
    }
}

/// A chunk record stored in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique record ID, chosen by ingestion.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Provenance metadata.
    pub metadata: ChunkMetadata,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// When this record was indexed.
    pub indexed_at: DateTime<Utc>,
}

impl ChunkRecord {
    /// Create a new record stamped with the current time.
    pub fn new(id: String, text: String, metadata: ChunkMetadata, embedding: Vec<f32>) -> Self {
        Self {
            id,
            text,
            metadata,
            embedding,
            indexed_at: Utc::now(),
        }
    }
}

/// A search result with score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched record.
    pub record: ChunkRecord,
    /// Similarity score (higher is better).
    pub score: f32,
}

/// Summary information about an indexed source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Source name.
    pub source: String,
    /// Number of indexed chunks.
    pub chunk_count: u32,
    /// When the source was last indexed.
    pub indexed_at: DateTime<Utc>,
}

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id. Returns how many were written.
    async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize>;

    /// The `k` records most similar to `embedding`, best first.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Atomically swap every record of `source` for `records`.
    ///
    /// On error the previous records of `source` are left in place.
    async fn replace_source(&self, source: &str, records: &[ChunkRecord]) -> Result<usize>;

    /// Delete every record of a source.
    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// List indexed sources, most recently indexed first.
    async fn list_sources(&self) -> Result<Vec<SourceSummary>>;

    /// Total record count.
    async fn count(&self) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Score every record against `embedding` and keep the best `k`.
///
/// Ties keep insertion order, so ranking is deterministic for a fixed input.
/// A record embedded with a different dimension than the query cannot be
/// ranked and fails the whole query.
pub(crate) fn rank_records<I>(records: I, embedding: &[f32], k: usize) -> Result<Vec<SearchResult>>
where
    I: IntoIterator<Item = ChunkRecord>,
{
    let mut results = Vec::new();
    for record in records {
        if record.embedding.len() != embedding.len() {
            return Err(KneeRagError::RetrievalFailure(format!(
                "chunk {} has {} dimensions, query has {}; re-ingest with the current embedding model",
                record.id,
                record.embedding.len(),
                embedding.len()
            )));
        }
        let score = cosine_similarity(embedding, &record.embedding);
        results.push(SearchResult { record, score });
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(k);
    Ok(results)
}
