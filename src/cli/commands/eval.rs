//! Eval command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::eval::{summarize, write_reports, Evaluator, TEST_QUERIES};
use crate::rag::{PromptVersion, QueryPipeline};
use anyhow::Result;

/// Run the eval command.
pub async fn run_eval(
    output: Option<String>,
    prompt_versions: &[String],
    top_k: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let versions: Vec<PromptVersion> = if prompt_versions.is_empty() {
        PromptVersion::ALL.to_vec()
    } else {
        prompt_versions
            .iter()
            .map(|v| v.parse())
            .collect::<crate::Result<_>>()?
    };
    if top_k == Some(0) {
        anyhow::bail!("--top-k must be at least 1");
    }

    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'kneerag doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let out_dir = match output {
        Some(dir) => Settings::expand_path(&dir),
        None => settings.results_dir(),
    };

    let pipeline = QueryPipeline::from_settings(&settings)?;
    let evaluator = Evaluator::new(&pipeline).with_top_k(top_k);

    let total = versions.len() * TEST_QUERIES.len();
    let pb = Output::progress_bar(total as u64, "Evaluating");

    let rows = evaluator
        .run_with_progress(&versions, &TEST_QUERIES, |row| {
            pb.set_message(format!("{} {}", row.prompt_version, row.question));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    let paths = write_reports(&rows, &out_dir)?;

    Output::header("Summary (means)");
    for s in summarize(&rows) {
        Output::kv(
            &format!("{} {}", s.prompt_version, s.prompt_version.label()),
            &format!(
                "{:.2} s, {:.0} tokens, ${:.6}{}",
                s.latency_total_sec,
                s.token_count,
                s.estimated_cost_usd,
                if s.failed > 0 {
                    format!(" ({} failed)", s.failed)
                } else {
                    String::new()
                }
            ),
        );
    }
    println!();

    Output::success(&format!("Saved raw results to {}", paths.raw.display()));
    Output::success(&format!("Saved summary metrics to {}", paths.summary.display()));
    Output::info("Score correctness and completeness manually in the raw results.");
    Ok(())
}
