//! Batch evaluation of the prompt strategies.
//!
//! Runs every prompt version over a fixed question set and writes the raw
//! rows (`eval_raw.json`) and per-version means (`eval_summary.csv`) for
//! manual scoring of correctness and completeness.

use crate::error::Result;
use crate::rag::{PromptVersion, QueryPipeline, RagResponse};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Questions used by `kneerag eval`.
pub const TEST_QUERIES: [&str; 10] = [
    "What are the typical symptoms of an ACL tear compared to a meniscus tear?",
    "When is MRI indicated for suspected knee ligament injury?",
    "What are the main non-surgical treatments for knee osteoarthritis?",
    "Which red-flag symptoms in knee pain require urgent referral?",
    "What are the return-to-sport criteria after ACL reconstruction?",
    "How long is typical rehabilitation after ACL surgery?",
    "When should a patient with knee pain avoid high-impact sports?",
    "What conservative treatments are recommended for partial ACL tears?",
    "How does age influence treatment choice for ACL injuries?",
    "What complications should clinicians monitor after knee surgery?",
];

pub const RAW_FILE: &str = "eval_raw.json";
pub const SUMMARY_FILE: &str = "eval_summary.csv";

/// Source reference kept in an evaluation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub page: Option<u32>,
}

/// One question answered with one prompt version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRow {
    pub prompt_version: PromptVersion,
    pub question: String,
    pub answer: String,
    pub latency_model_only_sec: f64,
    pub latency_total_sec: f64,
    pub token_count: u64,
    pub estimated_cost_usd: f64,
    pub num_sources: usize,
    pub sources: Vec<SourceRef>,
    /// Set when the question failed; metrics are then zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalRow {
    fn from_response(question: &str, response: &RagResponse, latency_total_sec: f64) -> Self {
        let sources: Vec<SourceRef> = response
            .retrieved_chunks
            .iter()
            .map(|chunk| SourceRef {
                source: chunk.metadata.source.clone(),
                page: chunk.metadata.page,
            })
            .collect();

        Self {
            prompt_version: response.prompt_version,
            question: question.to_string(),
            answer: response.answer.clone(),
            latency_model_only_sec: response.latency_seconds,
            latency_total_sec,
            token_count: response.token_count,
            estimated_cost_usd: response.estimated_cost_usd,
            num_sources: sources.len(),
            sources,
            error: None,
        }
    }

    fn failed(version: PromptVersion, question: &str, error: String) -> Self {
        Self {
            prompt_version: version,
            question: question.to_string(),
            answer: format!("ERROR: {}", error),
            latency_model_only_sec: 0.0,
            latency_total_sec: 0.0,
            token_count: 0,
            estimated_cost_usd: 0.0,
            num_sources: 0,
            sources: Vec::new(),
            error: Some(error),
        }
    }
}

/// Mean metrics of one prompt version over its successful rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalSummary {
    pub prompt_version: PromptVersion,
    pub latency_total_sec: f64,
    pub token_count: f64,
    pub estimated_cost_usd: f64,
    /// Rows that contributed to the means.
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs prompt versions over a question set.
pub struct Evaluator<'a> {
    pipeline: &'a QueryPipeline,
    top_k: Option<usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(pipeline: &'a QueryPipeline) -> Self {
        Self { pipeline, top_k: None }
    }

    /// Override the configured `top_k`.
    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    /// Answer one question, turning a failure into an error row.
    #[instrument(skip_all, fields(version = %version))]
    pub async fn run_query(&self, version: PromptVersion, question: &str) -> EvalRow {
        let started = Instant::now();
        match self.pipeline.answer(question, version, self.top_k).await {
            Ok(response) => {
                EvalRow::from_response(question, &response, started.elapsed().as_secs_f64())
            }
            Err(e) => {
                warn!("Query failed with {}: {} ({})", version, question, e);
                EvalRow::failed(version, question, e.to_string())
            }
        }
    }

    /// Every version over every question, version-major.
    pub async fn run(&self, versions: &[PromptVersion], queries: &[&str]) -> Vec<EvalRow> {
        self.run_with_progress(versions, queries, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_row` as each row completes.
    pub async fn run_with_progress<F>(
        &self,
        versions: &[PromptVersion],
        queries: &[&str],
        mut on_row: F,
    ) -> Vec<EvalRow>
    where
        F: FnMut(&EvalRow),
    {
        let mut rows = Vec::with_capacity(versions.len() * queries.len());
        for &version in versions {
            info!("Evaluating prompt version {} ({})", version, version.label());
            for question in queries {
                let row = self.run_query(version, question).await;
                on_row(&row);
                rows.push(row);
            }
        }
        rows
    }
}

/// Per-version means, in version order. Versions without rows are omitted.
pub fn summarize(rows: &[EvalRow]) -> Vec<EvalSummary> {
    PromptVersion::ALL
        .iter()
        .filter_map(|&version| {
            let of_version: Vec<&EvalRow> =
                rows.iter().filter(|r| r.prompt_version == version).collect();
            if of_version.is_empty() {
                return None;
            }

            let ok: Vec<&EvalRow> = of_version.iter().copied().filter(|r| r.error.is_none()).collect();
            let n = ok.len();
            let mean = |f: fn(&EvalRow) -> f64| {
                if n == 0 {
                    0.0
                } else {
                    ok.iter().map(|r| f(*r)).sum::<f64>() / n as f64
                }
            };

            Some(EvalSummary {
                prompt_version: version,
                latency_total_sec: mean(|r| r.latency_total_sec),
                token_count: mean(|r| r.token_count as f64),
                estimated_cost_usd: mean(|r| r.estimated_cost_usd),
                succeeded: n,
                failed: of_version.len() - n,
            })
        })
        .collect()
}

const SUMMARY_HEADER: [&str; 4] = [
    "prompt_version",
    "latency_total_sec",
    "token_count",
    "estimated_cost_usd",
];

/// Write the summary as CSV to `writer`.
pub fn write_summary_csv<W: std::io::Write>(summaries: &[EvalSummary], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(SUMMARY_HEADER)?;
    for s in summaries {
        csv.write_record([
            s.prompt_version.to_string(),
            s.latency_total_sec.to_string(),
            s.token_count.to_string(),
            s.estimated_cost_usd.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Paths of the written reports.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub raw: PathBuf,
    pub summary: PathBuf,
}

/// Write `eval_raw.json` and `eval_summary.csv` into `dir`, creating it if needed.
pub fn write_reports(rows: &[EvalRow], dir: &Path) -> Result<ReportPaths> {
    std::fs::create_dir_all(dir)?;

    let raw = dir.join(RAW_FILE);
    std::fs::write(&raw, serde_json::to_string_pretty(rows)?)?;

    let summary = dir.join(SUMMARY_FILE);
    write_summary_csv(&summarize(rows), std::fs::File::create(&summary)?)?;

    info!("Wrote {} and {}", raw.display(), summary.display());
    Ok(ReportPaths { raw, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::error::KneeRagError;
    use crate::generation::{Generation, Generator};
    use crate::rag::PipelineConfig;
    use crate::vector_store::{ChunkMetadata, ChunkRecord, MemoryVectorStore, VectorStore};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    /// Charges more tokens for longer prompts and fails on a marker question.
    struct ScriptedGenerator;

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _temperature: f32) -> Result<Generation> {
            if prompt.contains("FAIL") {
                return Err(KneeRagError::GenerationFailure {
                    message: "backend overloaded".to_string(),
                    status: Some(503),
                });
            }
            Ok(Generation {
                text: "Answer [Source 1].".to_string(),
                latency_seconds: 0.0,
                token_count: if prompt.contains("### Example") { 300 } else { 100 },
                raw: serde_json::json!({}),
            })
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    async fn pipeline() -> QueryPipeline {
        let store = Arc::new(MemoryVectorStore::new());
        store
            .upsert(&[ChunkRecord::new(
                "aaos.txt#p4-c0".to_string(),
                "MRI is indicated when instability persists.".to_string(),
                ChunkMetadata::paged("aaos.txt", 4, 0),
                vec![1.0, 0.0],
            )])
            .await
            .unwrap();

        QueryPipeline::new(
            Arc::new(UnitEmbedder),
            store,
            Arc::new(ScriptedGenerator),
            PipelineConfig {
                default_top_k: 4,
                price_per_million_tokens: 2.0,
                temperature: 0.2,
            },
        )
    }

    fn row(version: PromptVersion, latency: f64, tokens: u64, cost: f64) -> EvalRow {
        EvalRow {
            prompt_version: version,
            question: "q".to_string(),
            answer: "a".to_string(),
            latency_model_only_sec: latency / 2.0,
            latency_total_sec: latency,
            token_count: tokens,
            estimated_cost_usd: cost,
            num_sources: 0,
            sources: Vec::new(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_run_sweeps_versions_in_order() {
        let pipeline = pipeline().await;
        let evaluator = Evaluator::new(&pipeline);

        let rows = evaluator
            .run(&PromptVersion::ALL, &TEST_QUERIES[..2])
            .await;

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].prompt_version, PromptVersion::V1);
        assert_eq!(rows[5].prompt_version, PromptVersion::V3);
        assert_eq!(rows[1].question, TEST_QUERIES[1]);
        assert_eq!(rows[0].num_sources, 1);
        assert_eq!(
            rows[0].sources,
            vec![SourceRef { source: "aaos.txt".to_string(), page: Some(4) }]
        );
        assert_eq!(rows[2].token_count, 300);
        assert!((rows[2].estimated_cost_usd - 0.0006).abs() < 1e-12);
        assert!(rows.iter().all(|r| r.latency_total_sec >= r.latency_model_only_sec));
    }

    #[tokio::test]
    async fn test_run_with_progress_sees_every_row() {
        let pipeline = pipeline().await;
        let evaluator = Evaluator::new(&pipeline);

        let mut seen = Vec::new();
        let rows = evaluator
            .run_with_progress(&[PromptVersion::V2], &["FAIL now", "ok"], |row| {
                seen.push(row.error.is_some())
            })
            .await;

        assert_eq!(rows.len(), 2);
        assert_eq!(seen, vec![true, false]);
    }

    #[tokio::test]
    async fn test_failed_query_becomes_error_row() {
        let pipeline = pipeline().await;
        let evaluator = Evaluator::new(&pipeline);

        let rows = evaluator.run(&[PromptVersion::V1], &["FAIL please", "fine"]).await;

        assert_eq!(rows.len(), 2);
        assert!(rows[0].error.as_deref().unwrap().contains("HTTP 503"));
        assert!(rows[0].answer.starts_with("ERROR:"));
        assert_eq!(rows[0].token_count, 0);
        assert!(rows[1].error.is_none());
    }

    #[test]
    fn test_summarize_means_per_version() {
        let mut failed = row(PromptVersion::V1, 0.0, 0, 0.0);
        failed.error = Some("boom".to_string());

        let rows = vec![
            row(PromptVersion::V2, 4.0, 300, 0.0003),
            row(PromptVersion::V1, 1.0, 100, 0.0001),
            row(PromptVersion::V1, 3.0, 200, 0.0002),
            failed,
        ];

        let summary = summarize(&rows);
        assert_eq!(summary.len(), 2);

        assert_eq!(summary[0].prompt_version, PromptVersion::V1);
        assert!((summary[0].latency_total_sec - 2.0).abs() < 1e-12);
        assert!((summary[0].token_count - 150.0).abs() < 1e-12);
        assert!((summary[0].estimated_cost_usd - 0.00015).abs() < 1e-12);
        assert_eq!(summary[0].succeeded, 2);
        assert_eq!(summary[0].failed, 1);

        assert_eq!(summary[1].prompt_version, PromptVersion::V2);
        assert_eq!(summary[1].token_count, 300.0);
    }

    #[test]
    fn test_write_reports() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("results");
        let rows = vec![
            row(PromptVersion::V1, 1.5, 100, 0.0001),
            row(PromptVersion::V3, 2.5, 50, 0.00005),
        ];

        let paths = write_reports(&rows, &out).unwrap();

        let csv = std::fs::read_to_string(&paths.summary).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "prompt_version,latency_total_sec,token_count,estimated_cost_usd");
        assert_eq!(lines[1], "v1,1.5,100,0.0001");
        assert_eq!(lines[2], "v3,2.5,50,0.00005");
        assert_eq!(lines.len(), 3);

        let mut reader = csv::Reader::from_path(&paths.summary).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 4);
        let first = reader.records().next().unwrap().unwrap();
        assert_eq!(first.get(0), Some("v1"));
        assert_eq!(first.get(2), Some("100"));

        let raw: Vec<EvalRow> =
            serde_json::from_str(&std::fs::read_to_string(&paths.raw).unwrap()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[1].prompt_version, PromptVersion::V3);
    }
}
