//! Interactive question loop.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::rag::{PromptVersion, QueryPipeline};
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Map the menu choice to a prompt version. Blank or invalid input is `None`.
fn parse_choice(input: &str) -> Option<PromptVersion> {
    match input.trim() {
        "1" => Some(PromptVersion::V1),
        "2" => Some(PromptVersion::V2),
        "3" => Some(PromptVersion::V3),
        _ => None,
    }
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Print `prompt` and read one trimmed line. `None` on end of input.
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

/// Run the interactive chat command.
pub async fn run_chat(top_k: Option<usize>, settings: Settings) -> Result<()> {
    if top_k == Some(0) {
        anyhow::bail!("--top-k must be at least 1");
    }

    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'kneerag doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let pipeline = QueryPipeline::from_settings(&settings)?;

    println!("\n{}", style("Knee Injury RAG Assistant").bold().cyan());
    println!("{}", style("Type 'exit' or 'quit' to leave.").dim());

    loop {
        println!(
            "\nChoose prompt version: 1) {}  2) {}  3) {}",
            PromptVersion::V1.label(),
            PromptVersion::V2.label(),
            PromptVersion::V3.label()
        );
        let Some(choice) = read_line("Enter 1/2/3 (default 1): ")? else {
            break;
        };
        if is_exit(&choice) {
            break;
        }
        let version = if choice.is_empty() {
            PromptVersion::V1
        } else {
            parse_choice(&choice).unwrap_or_else(|| {
                Output::warning("Invalid choice, defaulting to 1.");
                PromptVersion::V1
            })
        };

        let Some(question) = read_line(&format!("\n{} ", style("Your question:").green().bold()))? else {
            break;
        };
        if is_exit(&question) {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let result = pipeline.answer(&question, version, top_k).await;
        spinner.finish_and_clear();

        match result {
            Ok(response) => Output::response(&response),
            Err(e) => {
                Output::error(&format!("Error: {}", e));
                if e.is_retryable() {
                    Output::info("You can ask again.");
                }
            }
        }
    }

    Output::info("Goodbye!");
    Ok(())
}
