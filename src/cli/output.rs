//! CLI output formatting utilities.

use crate::rag::RagResponse;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print an indexed source.
    pub fn source_info(source: &str, chunks: u32, indexed_at: &str) {
        println!(
            "  {} {} ({} chunks, {})",
            style("*").cyan(),
            style(source).bold(),
            chunks,
            style(indexed_at).dim()
        );
    }

    /// Print search result.
    pub fn search_result(rank: usize, source: &str, page: &str, score: f32, content: &str) {
        println!(
            "\n{} {} page {} (score: {:.2})",
            style(format!("[{}]", rank)).green(),
            style(source).bold(),
            style(page).cyan(),
            score
        );
        println!("   {}", content_preview(content, 200));
    }

    /// Print an answer with its metrics and numbered sources.
    pub fn response(response: &RagResponse) {
        Output::header("Answer");
        println!("{}", response.answer);

        Output::header("Metrics");
        Output::kv(
            "Prompt version",
            &format!("{} ({})", response.prompt_version, response.prompt_version.label()),
        );
        Output::kv("Latency", &format!("{:.2} s", response.latency_seconds));
        Output::kv("Tokens", &response.token_count.to_string());
        Output::kv(
            "Estimated cost (hypothetical)",
            &format!("${:.6}", response.estimated_cost_usd),
        );

        Output::header("Sources");
        if response.retrieved_chunks.is_empty() {
            println!("  {}", style("(none retrieved)").dim());
        }
        for line in response.source_lines() {
            println!("  {}", line);
        }
        println!();
    }

    /// Create a progress bar.
    pub fn progress_bar(len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate content with ellipsis, on a character boundary.
pub(crate) fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
