//! kneerag CLI entry point.

use anyhow::Result;
use clap::Parser;
use kneerag::cli::{commands, Cli, Commands, Output};
use kneerag::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("kneerag={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli
        .config
        .as_ref()
        .map(|p| Settings::expand_path(p))
        .unwrap_or_else(Settings::default_config_path);

    let settings = match (&cli.command, Settings::load_from(Some(&config_path))) {
        (_, Ok(settings)) => settings,
        // `config init --force` must still be able to replace a broken file.
        (Commands::Config { .. }, Err(e)) => {
            Output::warning(&format!("Ignoring invalid config: {}", e));
            Settings::default()
        }
        (_, Err(e)) => return Err(e.into()),
    };

    match &cli.command {
        Commands::Ingest { dir } => {
            std::fs::create_dir_all(settings.data_dir())?;
            commands::run_ingest(dir, settings).await?;
        }

        Commands::Ask {
            question,
            prompt_version,
            top_k,
            json,
        } => {
            commands::run_ask(question, prompt_version, *top_k, *json, settings).await?;
        }

        Commands::Chat { top_k } => {
            commands::run_chat(*top_k, settings).await?;
        }

        Commands::Eval {
            output,
            prompt_versions,
            top_k,
        } => {
            commands::run_eval(output.clone(), prompt_versions, *top_k, settings).await?;
        }

        Commands::Search { query, limit } => {
            commands::run_search(query, *limit, settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, &config_path).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
