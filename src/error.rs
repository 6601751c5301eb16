//! Error types for kneerag.

use thiserror::Error;

/// Library-level error type for kneerag operations.
///
/// The query pipeline never recovers from any of these silently: every
/// failure aborts the current question and reaches the caller as one of
/// these kinds.
#[derive(Error, Debug)]
pub enum KneeRagError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Retrieval failed: {0}")]
    RetrievalFailure(String),

    #[error("Generation failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    GenerationFailure {
        message: String,
        /// HTTP status returned by the backend, if it answered at all.
        status: Option<u16>,
    },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl KneeRagError {
    /// Build a generation failure without an HTTP status (transport, timeout, decode).
    pub fn generation(message: impl Into<String>) -> Self {
        KneeRagError::GenerationFailure {
            message: message.into(),
            status: None,
        }
    }

    /// Whether retrying the whole question might succeed.
    ///
    /// Only a hint for front ends; the pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            KneeRagError::GenerationFailure { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => true,
            },
            KneeRagError::RetrievalFailure(_) | KneeRagError::Embedding(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for kneerag operations.
pub type Result<T> = std::result::Result<T, KneeRagError>;
