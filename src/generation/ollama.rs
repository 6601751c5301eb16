//! Ollama generation client.
//!
//! Speaks the non-streaming `/api/generate` protocol:
//!
//! - request:  `{ "model", "prompt", "stream": false, "options": { "temperature" } }`
//! - response: `{ "response", "eval_count", "prompt_eval_count", ... }`
//!
//! `token_count` is `eval_count + prompt_eval_count`. Counts missing from the
//! payload (Ollama omits `prompt_eval_count` when the prompt is cached) are
//! treated as zero.

use super::{validate_base_url, Generation, Generator};
use crate::config::GenerationSettings;
use crate::error::{KneeRagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Client for a local Ollama server.
pub struct OllamaGenerator {
    client: reqwest::Client,
    model: String,
    url_generate: String,
    url_tags: String,
}

impl OllamaGenerator {
    /// Create a client for `base_url` with a bounded request timeout.
    ///
    /// # Errors
    /// - [`KneeRagError::Config`] if `base_url` is not an http(s) URL
    /// - [`KneeRagError::Http`] if the HTTP client cannot be built
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let base = validate_base_url(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            model: model.to_string(),
            url_generate: format!("{}/api/generate", base),
            url_tags: format!("{}/api/tags", base),
        })
    }

    /// Create a client from generation settings.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self> {
        Self::new(
            &settings.base_url,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Check that the server answers and list its installed models.
    #[instrument(skip_all)]
    pub async fn health(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(&self.url_tags)
            .send()
            .await
            .map_err(|e| KneeRagError::generation(format!("GET {} failed: {}", self.url_tags, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(KneeRagError::GenerationFailure {
                message: format!("GET {} returned {}", self.url_tags, status),
                status: Some(status.as_u16()),
            });
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| KneeRagError::generation(format!("failed to decode model list: {}", e)))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };

        debug!("POST {}", self.url_generate);
        let started = Instant::now();

        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let cause = if e.is_timeout() { "request timed out" } else { "transport error" };
                KneeRagError::generation(format!("{} calling {}: {}", cause, self.url_generate, e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let snippet = text.chars().take(240).collect::<String>();
            return Err(KneeRagError::GenerationFailure {
                message: format!("unexpected status from {}: {}", self.url_generate, snippet),
                status: Some(status.as_u16()),
            });
        }

        let mut payload: serde_json::Value = resp.json().await.map_err(|e| {
            KneeRagError::generation(format!("failed to decode response: {}; ensure `stream=false` is used", e))
        })?;
        let latency_seconds = started.elapsed().as_secs_f64();

        let parsed: GenerateResponse = serde_json::from_value(payload.clone())
            .map_err(|e| KneeRagError::generation(format!("malformed generate payload: {}", e)))?;

        if let Some(obj) = payload.as_object_mut() {
            obj.remove("response");
        }

        let token_count = parsed.eval_count + parsed.prompt_eval_count;
        debug!(
            eval_count = parsed.eval_count,
            prompt_eval_count = parsed.prompt_eval_count,
            "generation finished in {:.2}s",
            latency_seconds
        );

        Ok(Generation {
            text: parsed.response,
            latency_seconds,
            token_count,
            raw: payload,
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for `/api/generate` (non-streaming).
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: u64,
    #[serde(default)]
    prompt_eval_count: u64,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_generate_sends_schema_and_sums_tokens() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();

        let app = Router::new().route(
            "/api/generate",
            post(move |Json(body): Json<Value>| {
                let seen = seen_in_handler.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!({
                        "model": "llama3.1:8b",
                        "response": "Criteria include...",
                        "done": true,
                        "eval_count": 40,
                        "prompt_eval_count": 200
                    }))
                }
            }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "llama3.1:8b", Duration::from_secs(5)).unwrap();
        let out = generator.generate("prompt text", 0.3).await.unwrap();

        assert_eq!(out.text, "Criteria include...");
        assert_eq!(out.token_count, 240);
        assert!(out.latency_seconds >= 0.0);
        assert_eq!(out.raw["done"], true);
        assert!(out.raw.get("response").is_none());

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "llama3.1:8b");
        assert_eq!(body["prompt"], "prompt text");
        assert_eq!(body["stream"], false);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_missing_counts_default_to_zero() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({ "response": "ok", "eval_count": 12 })) }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "m", Duration::from_secs(5)).unwrap();
        assert_eq!(generator.generate("p", 0.0).await.unwrap().token_count, 12);
    }

    #[tokio::test]
    async fn test_http_500_is_generation_failure_with_status() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "m", Duration::from_secs(5)).unwrap();
        match generator.generate("p", 0.0).await {
            Err(KneeRagError::GenerationFailure { status, message }) => {
                assert_eq!(status, Some(500));
                assert!(message.contains("model crashed"));
            }
            other => panic!("expected GenerationFailure, got {:?}", other.map(|g| g.text)),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_generation_failure() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({ "unexpected": true })) }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "m", Duration::from_secs(5)).unwrap();
        let err = generator.generate("p", 0.0).await.unwrap_err();
        assert!(matches!(err, KneeRagError::GenerationFailure { status: None, .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_generation_failure() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "response": "too late" }))
            }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "m", Duration::from_millis(200)).unwrap();
        let err = generator.generate("p", 0.0).await.unwrap_err();
        assert!(matches!(err, KneeRagError::GenerationFailure { status: None, .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_generation_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let generator =
            OllamaGenerator::new(&format!("http://{}", addr), "m", Duration::from_secs(2)).unwrap();
        let err = generator.generate("p", 0.0).await.unwrap_err();
        assert!(matches!(err, KneeRagError::GenerationFailure { .. }));
    }

    #[tokio::test]
    async fn test_health_lists_models() {
        let app = Router::new().route(
            "/api/tags",
            get(|| async {
                Json(json!({ "models": [{ "name": "llama3.1:8b" }, { "name": "nomic-embed-text:latest" }] }))
            }),
        );
        let base = serve(app).await;

        let generator = OllamaGenerator::new(&base, "m", Duration::from_secs(5)).unwrap();
        let models = generator.health().await.unwrap();
        assert_eq!(models, vec!["llama3.1:8b", "nomic-embed-text:latest"]);
    }
}
