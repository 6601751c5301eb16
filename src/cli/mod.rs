//! CLI module for kneerag.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// kneerag - Knee injury question answering over your own sources
///
/// Index clinical documents, then ask questions answered by a local model
/// with numbered source citations, latency, token and cost metrics.
#[derive(Parser, Debug)]
#[command(name = "kneerag")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and index every .txt/.md document in a directory
    Ingest {
        /// Directory with raw documents
        #[arg(default_value = "data/raw")]
        dir: String,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Prompt strategy: v1 (zero-shot), v2 (few-shot structured), v3 (chain-of-thought)
        #[arg(short, long, default_value = "v1")]
        prompt_version: String,

        /// Number of chunks to retrieve (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive question loop
    Chat {
        /// Number of chunks to retrieve (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Run every prompt version over the test questions and write reports
    Eval {
        /// Output directory (defaults to general.results_dir)
        #[arg(short, long)]
        output: Option<String>,

        /// Only evaluate these versions (repeatable)
        #[arg(short, long = "prompt-version")]
        prompt_versions: Vec<String>,

        /// Number of chunks to retrieve (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Show the chunks retrieved for a query, without generating
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// List indexed sources
    List,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check configuration, index and generation backend
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_defaults() {
        let cli = Cli::try_parse_from(["kneerag", "ask", "Is surgery needed for a partial ACL tear?"]).unwrap();
        match cli.command {
            Commands::Ask {
                question,
                prompt_version,
                top_k,
                json,
            } => {
                assert_eq!(question, "Is surgery needed for a partial ACL tear?");
                assert_eq!(prompt_version, "v1");
                assert_eq!(top_k, None);
                assert!(!json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_eval_repeatable_versions_and_global_flags() {
        let cli = Cli::try_parse_from([
            "kneerag", "eval", "-p", "v1", "-p", "v3", "-vv", "--config", "/tmp/k.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some("/tmp/k.toml"));
        match cli.command {
            Commands::Eval { prompt_versions, .. } => assert_eq!(prompt_versions, vec!["v1", "v3"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::try_parse_from(["kneerag", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true }
            }
        ));
    }
}
