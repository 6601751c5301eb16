//! kneerag - Retrieval-augmented answers to knee injury questions
//!
//! A local-first CLI and library that indexes clinical documents and
//! answers questions about knee injuries with a locally hosted model,
//! citing the passages each answer was grounded on.
//!
//! # Overview
//!
//! kneerag allows you to:
//! - Ingest text documents into a persistent vector index
//! - Ask questions with one of three prompt strategies
//! - See latency, token usage and a hypothetical cost for every answer
//! - Compare the strategies over a fixed question set
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `chunking` - Fixed-size window chunking
//! - `embedding` - Embedding generation
//! - `vector_store` - Vector index abstraction
//! - `generation` - Text generation backends
//! - `rag` - Prompt building and the query pipeline
//! - `ingest` - Document loading and indexing
//! - `eval` - Batch evaluation of prompt strategies
//!
//! # Example
//!
//! ```rust,no_run
//! use kneerag::config::Settings;
//! use kneerag::rag::{PromptVersion, QueryPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = QueryPipeline::from_settings(&settings)?;
//!
//!     let response = pipeline
//!         .answer("What are return-to-sport criteria after ACL reconstruction?", PromptVersion::V2, None)
//!         .await?;
//!     println!("{}", response.format_for_display());
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod generation;
pub mod ingest;
pub mod openai;
pub mod rag;
pub mod vector_store;

pub use error::{KneeRagError, Result};
