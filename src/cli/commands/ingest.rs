//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::ingest::{load_documents, Ingestor};
use anyhow::Result;

/// Run the ingest command.
pub async fn run_ingest(dir: &str, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ingest, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'kneerag doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let dir = Settings::expand_path(dir);
    let documents = load_documents(&dir)?;
    if documents.is_empty() {
        Output::warning(&format!("No .txt or .md documents found in {}", dir.display()));
        return Ok(());
    }

    let ingestor = Ingestor::from_settings(&settings)?;
    let pb = Output::progress_bar(documents.len() as u64, "Embedding documents");

    let result = ingestor
        .ingest_documents(&documents, |document, _| {
            pb.set_message(document.source.clone());
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Ingestion stopped after {} documents: {}", pb.position(), e));
            return Err(e.into());
        }
    };

    Output::success(&format!(
        "Indexed {} chunks from {} documents",
        report.chunks, report.documents
    ));
    Output::kv("Index", &settings.sqlite_path().display().to_string());
    Ok(())
}
