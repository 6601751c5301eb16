//! Configuration module for kneerag.
//!
//! Settings come from a TOML file with `KNEERAG_*` environment overrides.

mod settings;

pub use settings::{
    ChunkingSettings, EmbeddingProvider, EmbeddingSettings, GeneralSettings,
    GenerationSettings, RetrievalSettings, Settings, VectorStoreSettings,
};
