//! RAG (Retrieval-Augmented Generation) for question answering with sources.
//!
//! The [`QueryPipeline`] embeds a question, retrieves the best-matching
//! chunks, builds one of three prompts and asks the generation backend,
//! returning the answer together with latency, token and cost metrics and
//! the chunks it was grounded on.

pub mod pipeline;
pub mod prompt;

pub use pipeline::{estimate_cost_usd, PipelineConfig, QueryPipeline};
pub use prompt::{build_prompt, serialize_context, PromptVersion, SAFETY_FRAMING};

use crate::vector_store::{ChunkMetadata, SearchResult};
use serde::{Deserialize, Serialize};

/// One retrieval result, in rank order within a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Raw chunk content.
    pub text: String,
    /// Provenance metadata.
    pub metadata: ChunkMetadata,
    /// Similarity to the question.
    pub score: f32,
}

impl RetrievedChunk {
    /// Create a chunk from parts.
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata, score: f32) -> Self {
        Self {
            text: text.into(),
            metadata,
            score,
        }
    }
}

impl From<SearchResult> for RetrievedChunk {
    fn from(result: SearchResult) -> Self {
        Self {
            text: result.record.text,
            metadata: result.record.metadata,
            score: result.score,
        }
    }
}

/// The result of one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
    /// The generated answer.
    pub answer: String,
    /// Time spent in the generation call only.
    pub latency_seconds: f64,
    /// Prompt plus completion tokens.
    pub token_count: u64,
    /// `token_count / 1_000_000 * price_per_million_tokens`.
    pub estimated_cost_usd: f64,
    /// Chunks used to build the prompt, best first.
    pub retrieved_chunks: Vec<RetrievedChunk>,
    /// Prompt strategy used.
    pub prompt_version: PromptVersion,
}

impl RagResponse {
    /// One line per source, numbered like the prompt's context blocks.
    pub fn source_lines(&self) -> Vec<String> {
        self.retrieved_chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                format!(
                    "[Source {}] {} (page {})",
                    i + 1,
                    chunk.metadata.source_label(),
                    chunk.metadata.page_label()
                )
            })
            .collect()
    }

    /// Format the response for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.answer.clone();

        if !self.retrieved_chunks.is_empty() {
            output.push_str("\n\n--- Sources ---\n");
            for line in self.source_lines() {
                output.push('\n');
                output.push_str(&line);
            }
        }

        output
    }
}
