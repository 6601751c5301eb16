//! Doctor command - verify configuration, index and backends.

use crate::cli::Output;
use crate::config::{EmbeddingProvider, Settings};
use crate::generation::OllamaGenerator;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use console::style;
use std::path::Path;
use std::time::Duration;

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(settings: &Settings, config_path: &Path) -> anyhow::Result<()> {
    Output::header("kneerag Doctor");
    println!();
    println!("Checking configuration, index and generation backend...\n");

    let mut checks = Vec::new();

    println!("{}", style("Configuration").bold());
    let config_check = check_config_file(config_path);
    config_check.print();
    checks.push(config_check);

    println!();

    println!("{}", style("Index").bold());
    let index_check = check_index(&settings.sqlite_path()).await;
    index_check.print();
    checks.push(index_check);

    println!();

    println!("{}", style("Backends").bold());
    let backend_checks = check_backends(settings).await;
    for check in &backend_checks {
        check.print();
    }
    checks.extend(backend_checks);

    println!();

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before asking questions.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! kneerag is ready to use.");
    }

    Ok(())
}

fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        CheckResult::ok("Config file", &format!("{}", config_path.display()))
    } else {
        CheckResult::warning(
            "Config file",
            "using defaults",
            "Create with: kneerag config init",
        )
    }
}

async fn check_index(db_path: &Path) -> CheckResult {
    if !db_path.exists() {
        return CheckResult::warning(
            "Index",
            &format!("{} (not created yet)", db_path.display()),
            "Create with: kneerag ingest <dir>",
        );
    }

    let size = std::fs::metadata(db_path)
        .map(|m| format_size(m.len()))
        .unwrap_or_else(|_| "unknown size".to_string());

    let store = match SqliteVectorStore::new(db_path) {
        Ok(store) => store,
        Err(e) => {
            return CheckResult::error(
                "Index",
                &format!("{} cannot be opened: {}", db_path.display(), e),
                "Delete the file and run: kneerag ingest <dir>",
            )
        }
    };

    match store.count().await {
        Ok(0) => CheckResult::warning(
            "Index",
            &format!("{} ({}, empty)", db_path.display(), size),
            "Add documents with: kneerag ingest <dir>",
        ),
        Ok(n) => CheckResult::ok("Index", &format!("{} ({}, {} chunks)", db_path.display(), size, n)),
        Err(e) => CheckResult::error(
            "Index",
            &format!("{} is unreadable: {}", db_path.display(), e),
            "Delete the file and run: kneerag ingest <dir>",
        ),
    }
}

async fn check_backends(settings: &Settings) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let generator = match OllamaGenerator::new(
        &settings.generation.base_url,
        &settings.generation.model,
        Duration::from_secs(5),
    ) {
        Ok(generator) => generator,
        Err(e) => {
            results.push(CheckResult::error(
                "Generation backend",
                &e.to_string(),
                "Fix generation.base_url (or KNEERAG_OLLAMA_URL)",
            ));
            return results;
        }
    };

    let models = match generator.health().await {
        Ok(models) => {
            results.push(CheckResult::ok(
                "Generation backend",
                &format!("{} ({} models)", settings.generation.base_url, models.len()),
            ));
            models
        }
        Err(e) => {
            results.push(CheckResult::error(
                "Generation backend",
                &format!("{} unreachable: {}", settings.generation.base_url, e),
                "Start it with: ollama serve",
            ));
            return results;
        }
    };

    results.push(check_model("Generation model", &settings.generation.model, &models));

    match settings.embedding.provider {
        EmbeddingProvider::Ollama => {
            results.push(check_model("Embedding model", &settings.embedding.model, &models));
        }
        EmbeddingProvider::OpenAI => {
            results.push(match std::env::var("OPENAI_API_KEY") {
                Ok(key) if !key.is_empty() => {
                    CheckResult::ok("Embedding model", &format!("{} (openai)", settings.embedding.model))
                }
                _ => CheckResult::error(
                    "Embedding model",
                    "OPENAI_API_KEY not set",
                    "Set with: export OPENAI_API_KEY='sk-...'",
                ),
            });
        }
    }

    results
}

/// Whether `model` is installed. Ollama lists untagged models as `name:latest`.
fn model_installed(model: &str, installed: &[String]) -> bool {
    installed
        .iter()
        .any(|m| m == model || (!model.contains(':') && *m == format!("{}:latest", model)))
}

fn check_model(name: &str, model: &str, installed: &[String]) -> CheckResult {
    if model_installed(model, installed) {
        CheckResult::ok(name, model)
    } else {
        CheckResult::error(
            name,
            &format!("{} not installed", model),
            &format!("Install with: ollama pull {}", model),
        )
    }
}

/// Format file size in human-readable format.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
