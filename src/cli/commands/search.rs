//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::QueryPipeline;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(query: &str, limit: usize, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Search, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = QueryPipeline::from_settings(&settings)?;

    let spinner = Output::spinner("Searching...");
    let results = pipeline.retrieve(query, limit).await;
    spinner.finish_and_clear();

    match results {
        Ok(chunks) => {
            if chunks.is_empty() {
                Output::warning("No results. Is the index empty?");
            } else {
                Output::success(&format!("Found {} results", chunks.len()));

                for (i, chunk) in chunks.iter().enumerate() {
                    Output::search_result(
                        i + 1,
                        chunk.metadata.source_label(),
                        &chunk.metadata.page_label(),
                        chunk.score,
                        &chunk.text,
                    );
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
