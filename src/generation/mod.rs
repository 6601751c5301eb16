//! Text generation backends.
//!
//! The pipeline only needs "prompt in, text and token usage out"; the
//! concrete backend is a local Ollama server.

mod ollama;

pub use ollama::OllamaGenerator;

use crate::config::Settings;
use crate::error::{KneeRagError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Output of a single generation call.
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Wall-clock time of the HTTP round trip, as seen by the client.
    pub latency_seconds: f64,
    /// Prompt tokens plus completion tokens.
    pub token_count: u64,
    /// Backend payload minus the generated text (timings, model, context...).
    pub raw: serde_json::Value,
}

/// Trait for generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// Every failure (non-success status, timeout, malformed payload) is a
    /// [`KneeRagError::GenerationFailure`]. Implementations do not retry.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation>;

    /// Model identifier, for logs and reports.
    fn model(&self) -> &str;
}

/// Build the configured generator.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn Generator>> {
    Ok(Arc::new(OllamaGenerator::from_settings(&settings.generation)?))
}

/// Check that `base_url` is an absolute http(s) URL and strip trailing slashes.
pub fn validate_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim();
    let parsed = url::Url::parse(trimmed)
        .map_err(|e| KneeRagError::Config(format!("invalid backend URL {:?}: {}", base_url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.trim_end_matches('/').to_string()),
        other => Err(KneeRagError::Config(format!(
            "invalid backend URL {:?}: unsupported scheme {}",
            base_url, other
        ))),
    }
}
