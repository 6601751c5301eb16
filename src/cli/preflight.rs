//! Pre-flight checks before commands that talk to external services.
//!
//! Catches missing configuration up front instead of failing after the
//! first network round trip.

use crate::config::{EmbeddingProvider, Settings};
use crate::error::{KneeRagError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Ingestion needs an embedding provider.
    Ingest,
    /// Answering needs an embedding provider and an index.
    Ask,
    /// Search needs an embedding provider and an index.
    Search,
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    check_with_env(operation, settings, |key| std::env::var(key).ok())
}

fn check_with_env<F>(operation: Operation, settings: &Settings, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if settings.embedding.provider == EmbeddingProvider::OpenAI {
        check_api_key(&env)?;
    }

    match operation {
        Operation::Ingest => {}
        Operation::Ask | Operation::Search => {
            let db = settings.sqlite_path();
            if !db.exists() {
                return Err(KneeRagError::Config(format!(
                    "No index at {}. Run 'kneerag ingest <dir>' first.",
                    db.display()
                )));
            }
        }
    }
    Ok(())
}

fn check_api_key<F>(env: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match env("OPENAI_API_KEY") {
        Some(key) if !key.is_empty() => Ok(()),
        Some(_) => Err(KneeRagError::Config(
            "OPENAI_API_KEY is empty but embedding.provider is openai".to_string(),
        )),
        None => Err(KneeRagError::Config(
            "OPENAI_API_KEY not set but embedding.provider is openai".to_string(),
        )),
    }
}
