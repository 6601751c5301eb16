//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::{PromptVersion, QueryPipeline};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    prompt_version: &str,
    top_k: Option<usize>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    // Bad input is reported before anything is opened or contacted.
    let version: PromptVersion = prompt_version.parse()?;
    if top_k == Some(0) {
        anyhow::bail!("--top-k must be at least 1");
    }

    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'kneerag doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let pipeline = QueryPipeline::from_settings(&settings)?;

    let spinner = Output::spinner(&format!("Asking {}...", pipeline.model()));
    let result = pipeline.answer(question, version, top_k).await;
    spinner.finish_and_clear();

    match result {
        Ok(response) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                Output::response(&response);
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            if e.is_retryable() {
                Output::info("This may be temporary; try again.");
            }
            return Err(e.into());
        }
    }

    Ok(())
}
