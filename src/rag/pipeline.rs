//! The query pipeline: embed, retrieve, prompt, generate.

use super::prompt::{build_prompt, PromptVersion};
use super::{RagResponse, RetrievedChunk};
use crate::config::Settings;
use crate::embedding::{self, Embedder};
use crate::error::{KneeRagError, Result};
use crate::generation::{self, Generator};
use crate::vector_store::{SqliteVectorStore, VectorStore};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Per-pipeline knobs taken from [`Settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub default_top_k: usize,
    pub price_per_million_tokens: f64,
    pub temperature: f32,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_top_k: settings.retrieval.top_k,
            price_per_million_tokens: settings.generation.price_per_million_tokens,
            temperature: settings.generation.temperature,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

static REASONING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>").expect("unreachable error: invalid reasoning block regex")
});

/// Hypothetical cost of `token_count` tokens at `price_per_million_tokens`.
pub fn estimate_cost_usd(token_count: u64, price_per_million_tokens: f64) -> f64 {
    token_count as f64 / 1_000_000.0 * price_per_million_tokens
}

/// Retrieval-augmented question answering over an indexed corpus.
///
/// Holds only read-only handles, so one pipeline can serve concurrent
/// callers; each `answer` call runs its steps strictly in sequence.
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn Generator>,
    config: PipelineConfig,
}

impl QueryPipeline {
    /// Create a pipeline from its collaborators.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn Generator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            generator,
            config,
        }
    }

    /// Wire the configured embedder, SQLite index and generation backend.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?);
        Ok(Self::new(
            embedding::from_settings(settings)?,
            store,
            generation::from_settings(settings)?,
            PipelineConfig::from_settings(settings),
        ))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Model used for generation.
    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Retrieve the `top_k` chunks most similar to `question`, best first.
    #[instrument(skip(self, question))]
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            return Err(KneeRagError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }

        let query_embedding = self.embedder.embed(question).await?;

        let results = self
            .store
            .query(&query_embedding, top_k)
            .await
            .map_err(|e| match e {
                KneeRagError::RetrievalFailure(_) => e,
                other => KneeRagError::RetrievalFailure(other.to_string()),
            })?;

        Ok(results.into_iter().take(top_k).map(RetrievedChunk::from).collect())
    }

    /// Answer `question` with the given prompt strategy.
    ///
    /// `top_k` of `None` uses the configured default.
    #[instrument(skip_all, fields(version = %prompt_version, top_k = ?top_k))]
    pub async fn answer(
        &self,
        question: &str,
        prompt_version: PromptVersion,
        top_k: Option<usize>,
    ) -> Result<RagResponse> {
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        info!("Answering with prompt {} ({}): {}", prompt_version, prompt_version.label(), question);

        let chunks = self.retrieve(question, top_k).await?;
        debug!("Retrieved {} chunks", chunks.len());

        let prompt = build_prompt(prompt_version, question, &chunks);

        let started = Instant::now();
        let generation = self
            .generator
            .generate(&prompt, self.config.temperature)
            .await
            .map_err(|e| match e {
                KneeRagError::GenerationFailure { .. } => e,
                other => KneeRagError::generation(other.to_string()),
            })?;
        let latency_seconds = started.elapsed().as_secs_f64();

        let estimated_cost_usd =
            estimate_cost_usd(generation.token_count, self.config.price_per_million_tokens);
        debug!(
            token_count = generation.token_count,
            "Generated answer in {:.2}s", latency_seconds
        );

        Ok(RagResponse {
            answer: self.strip_reasoning(&generation.text),
            latency_seconds,
            token_count: generation.token_count,
            estimated_cost_usd,
            retrieved_chunks: chunks,
            prompt_version,
        })
    }

    /// Like [`answer`](Self::answer), with the version given as text (`"v1"`, `"2"`...).
    ///
    /// An unknown version fails before anything is embedded, retrieved or generated.
    pub async fn answer_str(
        &self,
        question: &str,
        prompt_version: &str,
        top_k: Option<usize>,
    ) -> Result<RagResponse> {
        let version: PromptVersion = prompt_version.parse()?;
        if top_k == Some(0) {
            return Err(KneeRagError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        self.answer(question, version, top_k).await
    }

    /// Remove `<think>` blocks and surrounding whitespace.
    pub fn strip_reasoning(&self, text: &str) -> String {
        REASONING_BLOCK.replace_all(text, "").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Generation, OllamaGenerator};
    use crate::vector_store::{ChunkMetadata, ChunkRecord, SearchResult, SourceSummary};
    use async_trait::async_trait;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(vec![1.0, 0.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    /// Index that returns a fixed ranking regardless of the query.
    struct FixedStore {
        results: Vec<SearchResult>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedStore {
        fn new(results: Vec<SearchResult>) -> Self {
            Self {
                results,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                results: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn upsert(&self, records: &[ChunkRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn query(&self, _embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(KneeRagError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "index.db missing",
                )));
            }
            Ok(self.results.iter().take(k).cloned().collect())
        }

        async fn replace_source(&self, _source: &str, records: &[ChunkRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn delete_by_source(&self, _source: &str) -> Result<usize> {
            Ok(0)
        }

        async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<usize> {
            Ok(self.results.len())
        }
    }

    struct CountingGenerator {
        text: String,
        token_count: u64,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl CountingGenerator {
        fn new(text: &str, token_count: u64) -> Self {
            Self {
                text: text.to_string(),
                token_count,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(&self, prompt: &str, _temperature: f32) -> Result<Generation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(Generation {
                text: self.text.clone(),
                latency_seconds: 0.01,
                token_count: self.token_count,
                raw: json!({}),
            })
        }

        fn model(&self) -> &str {
            "fake"
        }
    }

    fn result(source: &str, page: u32, text: &str, score: f32) -> SearchResult {
        SearchResult {
            record: ChunkRecord::new(
                format!("{}#p{}-c0", source, page),
                text.to_string(),
                ChunkMetadata::paged(source, page, 0),
                vec![1.0, 0.0, 0.0],
            ),
            score,
        }
    }

    fn acl_results() -> Vec<SearchResult> {
        vec![
            result(
                "sourceA",
                3,
                "Return to sport requires limb symmetry index above 90%.",
                0.92,
            ),
            result(
                "sourceB",
                7,
                "Graft maturation typically takes at least nine months.",
                0.88,
            ),
        ]
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_cost_formula() {
        assert_eq!(estimate_cost_usd(0, 1.0), 0.0);
        assert!((estimate_cost_usd(240, 1.0) - 0.00024).abs() < 1e-12);
        assert!((estimate_cost_usd(1_000_000, 2.5) - 2.5).abs() < 1e-12);
        assert!((estimate_cost_usd(1234, 0.5) - 0.000617).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_unknown_version_makes_no_external_calls() {
        let embedder = Arc::new(CountingEmbedder::default());
        let store = Arc::new(FixedStore::new(acl_results()));
        let generator = Arc::new(CountingGenerator::new("unused", 1));
        let pipeline = QueryPipeline::new(
            embedder.clone(),
            store.clone(),
            generator.clone(),
            PipelineConfig::default(),
        );

        let err = pipeline.answer_str("Is surgery needed?", "v9", None).await.unwrap_err();

        assert!(matches!(err, KneeRagError::InvalidArgument(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_top_k_is_invalid_argument() {
        let embedder = Arc::new(CountingEmbedder::default());
        let generator = Arc::new(CountingGenerator::new("unused", 1));
        let pipeline = QueryPipeline::new(
            embedder.clone(),
            Arc::new(FixedStore::new(acl_results())),
            generator.clone(),
            PipelineConfig::default(),
        );

        let err = pipeline
            .answer("q", PromptVersion::V1, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, KneeRagError::InvalidArgument(_)));
        assert!(matches!(
            pipeline.answer_str("q", "v1", Some(0)).await,
            Err(KneeRagError::InvalidArgument(_))
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_acl_scenario_against_fake_backend() {
        let captured: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let captured_in_handler = captured.clone();
        let app = Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<Value>| {
                let captured = captured_in_handler.clone();
                async move {
                    *captured.lock().unwrap() = Some(body);
                    Json(json!({
                        "response": "Criteria include strength symmetry [Source 1] and graft maturity [Source 2].",
                        "eval_count": 40,
                        "prompt_eval_count": 200
                    }))
                }
            }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "llama3.1:8b", Duration::from_secs(5)).unwrap();
        let pipeline = QueryPipeline::new(
            Arc::new(CountingEmbedder::default()),
            Arc::new(FixedStore::new(acl_results())),
            Arc::new(generator),
            PipelineConfig {
                default_top_k: 4,
                price_per_million_tokens: 1.0,
                temperature: 0.2,
            },
        );

        let question = "What are return-to-sport criteria after ACL reconstruction?";
        let response = pipeline
            .answer_str(question, "v1", Some(2))
            .await
            .unwrap();

        assert_eq!(response.token_count, 240);
        assert!((response.estimated_cost_usd - 0.00024).abs() < 1e-12);
        assert!(response.latency_seconds >= 0.0);
        assert_eq!(response.prompt_version, PromptVersion::V1);
        assert_eq!(response.retrieved_chunks.len(), 2);
        assert_eq!(response.retrieved_chunks[0].metadata.source, "sourceA");
        assert_eq!(response.retrieved_chunks[1].metadata.page, Some(7));

        let body = captured.lock().unwrap().clone().unwrap();
        let prompt = body["prompt"].as_str().unwrap();
        let first = prompt.find("[Source 1 | sourceA | page 3]").unwrap();
        let second = prompt.find("[Source 2 | sourceB | page 7]").unwrap();
        assert!(first < second);
        assert!(prompt.contains(question));
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn test_backend_500_is_generation_failure() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "out of memory") }),
        );
        let base = serve(app).await;

        let pipeline = QueryPipeline::new(
            Arc::new(CountingEmbedder::default()),
            Arc::new(FixedStore::new(acl_results())),
            Arc::new(OllamaGenerator::new(&base, "m", Duration::from_secs(5)).unwrap()),
            PipelineConfig::default(),
        );

        let err = pipeline
            .answer("q", PromptVersion::V2, None)
            .await
            .unwrap_err();
        match err {
            KneeRagError::GenerationFailure { status, .. } => assert_eq!(status, Some(500)),
            other => panic!("expected GenerationFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_index_error_is_retrieval_failure() {
        let generator = Arc::new(CountingGenerator::new("unused", 1));
        let pipeline = QueryPipeline::new(
            Arc::new(CountingEmbedder::default()),
            Arc::new(FixedStore::failing()),
            generator.clone(),
            PipelineConfig::default(),
        );

        let err = pipeline.answer("q", PromptVersion::V1, None).await.unwrap_err();
        assert!(matches!(err, KneeRagError::RetrievalFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_index_still_generates() {
        let generator = Arc::new(CountingGenerator::new("I cannot answer this from the available sources.", 80));
        let pipeline = QueryPipeline::new(
            Arc::new(CountingEmbedder::default()),
            Arc::new(FixedStore::new(Vec::new())),
            generator.clone(),
            PipelineConfig::default(),
        );

        let response = pipeline.answer("q", PromptVersion::V3, None).await.unwrap();
        assert!(response.retrieved_chunks.is_empty());
        assert_eq!(response.token_count, 80);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Context:\n\n"));
    }

    #[tokio::test]
    async fn test_top_k_bounds_chunks_and_default_applies() {
        let mut results = acl_results();
        results.push(result("sourceC", 1, "Third.", 0.5));
        let pipeline = QueryPipeline::new(
            Arc::new(CountingEmbedder::default()),
            Arc::new(FixedStore::new(results)),
            Arc::new(CountingGenerator::new("ok", 10)),
            PipelineConfig {
                default_top_k: 2,
                ..PipelineConfig::default()
            },
        );

        let response = pipeline.answer("q", PromptVersion::V1, None).await.unwrap();
        assert_eq!(response.retrieved_chunks.len(), 2);

        let response = pipeline.answer("q", PromptVersion::V1, Some(1)).await.unwrap();
        assert_eq!(response.retrieved_chunks.len(), 1);
        assert_eq!(response.retrieved_chunks[0].metadata.source, "sourceA");
    }

    #[tokio::test]
    async fn test_latency_covers_generation_only() {
        let embedder = Arc::new(CountingEmbedder {
            delay: Duration::from_millis(200),
            ..CountingEmbedder::default()
        });
        let pipeline = QueryPipeline::new(
            embedder.clone(),
            Arc::new(FixedStore::new(acl_results())),
            Arc::new(CountingGenerator::new("Nine months [Source 2].", 30)),
            PipelineConfig::default(),
        );

        let started = std::time::Instant::now();
        let response = pipeline.answer("q", PromptVersion::V1, None).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert!(
            response.latency_seconds < 0.1,
            "latency {} includes embedding time",
            response.latency_seconds
        );
    }

    #[tokio::test]
    async fn test_reasoning_blocks_are_removed() {
        let generator = Arc::new(CountingGenerator::new(
            "<think>\nThe user asks about grafts.\nSource 2 covers it.\n</think>\n\nAt least nine months [Source 2].",
            50,
        ));
        let pipeline = QueryPipeline::new(
            Arc::new(CountingEmbedder::default()),
            Arc::new(FixedStore::new(acl_results())),
            generator,
            PipelineConfig::default(),
        );

        let response = pipeline.answer("q", PromptVersion::V3, None).await.unwrap();
        assert_eq!(response.answer, "At least nine months [Source 2].");
        assert_eq!(pipeline.strip_reasoning("  plain  "), "plain");
    }
}
