//! Ollama embeddings implementation.

use super::Embedder;
use crate::error::{KneeRagError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Embedding requests are small; a stalled server should not block ingestion for long.
const EMBED_TIMEOUT_SECS: u64 = 60;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// `/api/embed` answers with `embeddings`, the legacy endpoint with `embedding`.
#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<Vec<f32>>,
    embeddings: Option<Vec<Vec<f32>>>,
}

/// Embedder backed by a local Ollama server.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
    max_concurrent: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder.
    pub fn new(base_url: &str, model: &str, dimensions: usize, max_concurrent: usize) -> Result<Self> {
        let base = crate::generation::validate_base_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/api/embed", base),
            model: model.to_string(),
            dimensions,
            max_concurrent: max_concurrent.max(1),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| KneeRagError::Embedding(format!("POST {} failed: {}", self.url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let snippet: String = resp.text().await.unwrap_or_default().chars().take(240).collect();
            return Err(KneeRagError::Embedding(format!(
                "unexpected HTTP status {} from {}: {}",
                status, self.url, snippet
            )));
        }

        let out: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| KneeRagError::Embedding(format!("failed to decode embed response: {}", e)))?;

        let vector = match (out.embedding, out.embeddings) {
            (Some(v), _) => v,
            (None, Some(vs)) => vs
                .into_iter()
                .next()
                .ok_or_else(|| KneeRagError::Embedding("Empty embedding response".to_string()))?,
            (None, None) => {
                return Err(KneeRagError::Embedding("no embedding returned".to_string()));
            }
        };

        if vector.len() != self.dimensions {
            return Err(KneeRagError::Embedding(format!(
                "model {} returned {} dimensions, expected {}",
                self.model,
                vector.len(),
                self.dimensions
            )));
        }

        Ok(vector)
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        // Futures are built up front so the stream borrows nothing from `texts`.
        // `buffered` keeps output in input order.
        let requests: Vec<_> = texts.iter().map(|text| self.embed(text)).collect();
        let embeddings: Vec<Vec<f32>> = stream::iter(requests)
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        debug!("Generated {} embeddings", embeddings.len());
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
