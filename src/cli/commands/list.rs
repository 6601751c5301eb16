//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let db = settings.sqlite_path();
    if !db.exists() {
        Output::info("Nothing indexed yet. Use 'kneerag ingest <dir>' to add documents.");
        return Ok(());
    }

    let store = SqliteVectorStore::new(&db)?;

    match store.list_sources().await {
        Ok(sources) => {
            if sources.is_empty() {
                Output::info("Nothing indexed yet. Use 'kneerag ingest <dir>' to add documents.");
            } else {
                Output::header(&format!("Indexed Sources ({})", sources.len()));
                println!();

                for item in &sources {
                    Output::source_info(
                        &item.source,
                        item.chunk_count,
                        &item.indexed_at.format("%Y-%m-%d %H:%M").to_string(),
                    );
                }

                let total_chunks: u32 = sources.iter().map(|s| s.chunk_count).sum();
                println!();
                Output::kv("Total sources", &sources.len().to_string());
                Output::kv("Total chunks", &total_chunks.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list sources: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
