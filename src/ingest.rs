//! Document ingestion: load, chunk, embed, index.
//!
//! Raw documents are `.txt` or `.md` files. Text extracted from PDFs with
//! `pdftotext` keeps its form-feed page breaks, and those pages become the
//! `page` metadata of every chunk cut from them.

use crate::chunking::TextChunker;
use crate::config::Settings;
use crate::embedding::{self, Embedder};
use crate::error::{KneeRagError, Result};
use crate::vector_store::{ChunkMetadata, ChunkRecord, SqliteVectorStore, VectorStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

const PAGE_BREAK: char = '\x0c';
const EXTENSIONS: [&str; 2] = ["txt", "md"];

/// A loaded source document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Path relative to the ingested directory, `/`-separated. Used as the
    /// `source` of every chunk, so it is unique within one directory.
    pub source: String,
    /// Path the document was read from.
    pub path: PathBuf,
    /// Page texts in order. A document without page breaks is a single unnumbered page.
    pub pages: Vec<String>,
    /// Whether `pages` came from form-feed page breaks.
    pub paged: bool,
}

impl Document {
    /// Build a document from raw text.
    pub fn from_text(source: impl Into<String>, path: PathBuf, text: &str) -> Self {
        let paged = text.contains(PAGE_BREAK);
        let pages = if paged {
            text.split(PAGE_BREAK).map(str::to_string).collect()
        } else {
            vec![text.to_string()]
        };

        Self {
            source: source.into(),
            path,
            pages,
            paged,
        }
    }
}

/// Load every `.txt`/`.md` file below `dir`, sorted by path.
pub fn load_documents(dir: &Path) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        return Err(KneeRagError::InvalidArgument(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut paths = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .map(|entry| entry.into_path())
        .collect::<Vec<_>>();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let source = source_name(dir, &path);
        documents.push(Document::from_text(source, path, &text));
    }

    Ok(documents)
}

/// `path` relative to `dir`, joined with `/` on every platform.
fn source_name(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Deterministic record id for a chunk.
pub fn record_id(source: &str, page: Option<u32>, chunk_index: u32) -> String {
    match page {
        Some(page) => format!("{}#p{}-c{}", source, page, chunk_index),
        None => format!("{}#c{}", source, chunk_index),
    }
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Chunks, embeds and indexes documents.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunker: TextChunker,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, chunker: TextChunker) -> Self {
        Self {
            embedder,
            store,
            chunker,
        }
    }

    /// Wire the configured embedder, chunker and SQLite index.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?);
        Ok(Self::new(
            embedding::from_settings(settings)?,
            store,
            TextChunker::from_settings(&settings.chunking),
        ))
    }

    /// Split a document into records without embeddings.
    fn records_for(&self, document: &Document) -> Vec<(String, String, ChunkMetadata)> {
        let mut out = Vec::new();

        if document.paged {
            for (i, page_text) in document.pages.iter().enumerate() {
                let page = i as u32 + 1;
                for (idx, text) in self.chunker.chunk(page_text).into_iter().enumerate() {
                    let idx = idx as u32;
                    out.push((
                        record_id(&document.source, Some(page), idx),
                        text,
                        ChunkMetadata::paged(&document.source, page, idx),
                    ));
                }
            }
        } else {
            let text = document.pages.concat();
            for (idx, text) in self.chunker.chunk(&text).into_iter().enumerate() {
                let idx = idx as u32;
                out.push((
                    record_id(&document.source, None, idx),
                    text,
                    ChunkMetadata::indexed(&document.source, idx),
                ));
            }
        }

        out
    }

    /// Replace the indexed chunks of one document. Returns the number of chunks written.
    ///
    /// Everything is embedded before the index is touched, so a failure keeps
    /// the document's previous chunks.
    #[instrument(skip(self, document), fields(source = %document.source))]
    pub async fn ingest_document(&self, document: &Document) -> Result<usize> {
        let parts = self.records_for(document);
        if parts.is_empty() {
            warn!("{} has no text to index", document.path.display());
            self.store.replace_source(&document.source, &[]).await?;
            return Ok(0);
        }

        let texts: Vec<String> = parts.iter().map(|(_, text, _)| text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != parts.len() {
            return Err(KneeRagError::Embedding(format!(
                "expected {} embeddings, got {}",
                parts.len(),
                embeddings.len()
            )));
        }

        let records: Vec<ChunkRecord> = parts
            .into_iter()
            .zip(embeddings)
            .map(|((id, text, metadata), embedding)| ChunkRecord::new(id, text, metadata, embedding))
            .collect();

        let written = self.store.replace_source(&document.source, &records).await?;
        debug!("Indexed {} chunks", written);
        Ok(written)
    }

    /// Ingest `documents` in order, calling `on_document` with each document
    /// and its chunk count once it is indexed. Stops at the first failure.
    pub async fn ingest_documents<F>(&self, documents: &[Document], mut on_document: F) -> Result<IngestReport>
    where
        F: FnMut(&Document, usize),
    {
        let mut report = IngestReport::default();
        for document in documents {
            let chunks = match self.ingest_document(document).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!("Failed to ingest {}: {}", document.path.display(), e);
                    return Err(e);
                }
            };
            report.chunks += chunks;
            report.documents += 1;
            on_document(document, chunks);
        }

        info!(
            "Ingested {} documents ({} chunks)",
            report.documents, report.chunks
        );
        Ok(report)
    }

    /// Ingest every document below `dir`.
    #[instrument(skip(self))]
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let documents = load_documents(dir)?;
        info!("Ingesting {} documents from {}", documents.len(), dir.display());
        self.ingest_documents(&documents, |_, _| {}).await
    }
}
