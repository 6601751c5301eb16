//! Configuration settings for kneerag.

use crate::chunking::ChunkUnit;
use crate::error::{KneeRagError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub vector_store: VectorStoreSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory where evaluation reports are written.
    pub results_dir: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.kneerag".to_string(),
            results_dir: "./results".to_string(),
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of chunks retrieved per question when the caller does not say.
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

/// Generation backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Base URL of the local generation service.
    pub base_url: String,
    /// Model name passed to the backend.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Hypothetical price used for cost estimates.
    pub price_per_million_tokens: f64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.2,
            timeout_secs: 300,
            price_per_million_tokens: 1.0,
        }
    }
}

/// Embedding provider type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama embeddings endpoint (default).
    #[default]
    Ollama,
    /// Hosted OpenAI embeddings.
    OpenAI,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" | "local" => Ok(EmbeddingProvider::Ollama),
            "openai" => Ok(EmbeddingProvider::OpenAI),
            _ => Err(format!("Unknown embedding provider: {}", s)),
        }
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::Ollama => write!(f, "ollama"),
            EmbeddingProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (ollama, openai).
    pub provider: EmbeddingProvider,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Base URL for the Ollama provider. Falls back to the generation URL when empty.
    pub base_url: String,
    /// Maximum concurrent embedding requests during ingestion.
    pub max_concurrent: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            base_url: String::new(),
            max_concurrent: 4,
        }
    }
}

/// Chunking settings used by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Window size, in `unit`s.
    pub chunk_size: usize,
    /// Overlap between adjacent windows, in `unit`s.
    pub chunk_overlap: usize,
    /// Whether windows count characters or words.
    pub unit: ChunkUnit,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 150,
            unit: ChunkUnit::Chars,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Path to the SQLite index.
    pub sqlite_path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.kneerag/index.db".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Environment overrides are applied on top of the file, then the
    /// result is validated.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_overrides_from(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `KNEERAG_*` overrides read through `lookup`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KNEERAG_TOP_K") {
            self.retrieval.top_k = parse_override("KNEERAG_TOP_K", &v)?;
        }
        if let Some(v) = lookup("KNEERAG_PRICE_PER_MILLION_TOKENS") {
            self.generation.price_per_million_tokens =
                parse_override("KNEERAG_PRICE_PER_MILLION_TOKENS", &v)?;
        }
        if let Some(v) = lookup("KNEERAG_OLLAMA_URL") {
            self.generation.base_url = v;
        }
        if let Some(v) = lookup("KNEERAG_MODEL") {
            self.generation.model = v;
        }
        if let Some(v) = lookup("KNEERAG_TEMPERATURE") {
            self.generation.temperature = parse_override("KNEERAG_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("KNEERAG_TIMEOUT_SECS") {
            self.generation.timeout_secs = parse_override("KNEERAG_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("KNEERAG_EMBEDDING_PROVIDER") {
            self.embedding.provider = v
                .parse()
                .map_err(KneeRagError::Config)?;
        }
        if let Some(v) = lookup("KNEERAG_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = lookup("KNEERAG_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_override("KNEERAG_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("KNEERAG_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_override("KNEERAG_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("KNEERAG_DB") {
            self.vector_store.sqlite_path = v;
        }
        Ok(())
    }

    /// Reject combinations that would make the pipeline or ingestion misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(KneeRagError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if self.chunking.chunk_size == 0 {
            return Err(KneeRagError::Config("chunking.chunk_size must be at least 1".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(KneeRagError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.generation.price_per_million_tokens < 0.0 {
            return Err(KneeRagError::Config(
                "generation.price_per_million_tokens must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| KneeRagError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kneerag")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded results directory path.
    pub fn results_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.results_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Base URL used for Ollama embeddings.
    pub fn embedding_base_url(&self) -> &str {
        if self.embedding.base_url.is_empty() {
            &self.generation.base_url
        } else {
            &self.embedding.base_url
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KneeRagError::Config(format!("{} has an invalid value: {:?}", key, value)))
}
