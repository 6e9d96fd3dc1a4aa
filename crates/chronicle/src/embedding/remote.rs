//! Remote embedding provider using OpenAI-compatible APIs
//!
//! Posts to `{api_url}/embeddings` with a bearer key read from the
//! environment variable named in the config.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{ChronicleError, Result};

const MAX_RETRIES: u32 = 3;

/// Remote embedder using an OpenAI-compatible HTTP API
#[derive(Debug)]
pub struct RemoteEmbedder {
    client: Client,
    config: EmbeddingConfig,
    api_key: Option<String>,
    initial_backoff: Duration,
    /// Learned from the first response
    dimension: AtomicUsize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl RemoteEmbedder {
    /// Create a remote embedder; a missing API key is allowed for local servers.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            return Err(ChronicleError::Config(
                "embedding.api_url is required for the remote provider".to_string(),
            ));
        }
        url::Url::parse(&config.api_url)
            .map_err(|e| ChronicleError::Config(format!("Invalid embedding api_url: {e}")))?;

        let api_key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            warn!(
                "Embedding API key env var '{}' not set, sending unauthenticated requests",
                config.api_key_env
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChronicleError::Embedding(e.to_string()))?;

        info!(
            "RemoteEmbedder initialized with source: {}, model: {}, api_url: {}",
            config.source, config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            initial_backoff: Duration::from_secs(1),
            dimension: AtomicUsize::new(0),
        })
    }

    /// Override the first retry delay (doubles per attempt)
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.config.api_url.trim_end_matches('/'))
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint();
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };
        debug!("Calling {} embeddings at: {}", self.config.source, url);

        let mut last_error = None;
        let mut delay = self.initial_backoff;

        for attempt in 0..MAX_RETRIES {
            let mut builder = self.client.post(&url).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        warn!(
                            "Rate limited on attempt {}/{}, waiting {:?}",
                            attempt + 1,
                            MAX_RETRIES,
                            delay
                        );
                        last_error = Some("rate limited".to_string());
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(ChronicleError::Embedding(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let parsed: EmbeddingResponse = response
                        .json()
                        .await
                        .map_err(|e| ChronicleError::Embedding(format!("Invalid response: {e}")))?;
                    return self.collect(parsed, texts.len());
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(ChronicleError::Embedding(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    fn collect(&self, response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
        if response.data.len() != expected {
            return Err(ChronicleError::Embedding(format!(
                "Expected {expected} embeddings, got {}",
                response.data.len()
            )));
        }

        let mut data = response.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        if let Some(first) = embeddings.first() {
            self.dimension.store(first.len(), Ordering::Relaxed);
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.call_api(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChronicleError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.call_api(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        &self.config.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            api_url: format!("{}/v1", server.uri()),
            api_key_env: "CHRONICLE_TEST_EMBED_KEY_UNSET".to_string(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_new_requires_api_url() {
        let err = RemoteEmbedder::new(&EmbeddingConfig::default()).expect_err("should fail");
        assert!(matches!(err, ChronicleError::Config(_)));
    }

    #[tokio::test]
    async fn test_embed_posts_to_embeddings_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&config_for(&server)).expect("Failed to build embedder");
        let embedding = embedder.embed("hello").await.expect("Failed to embed");

        assert_eq!(embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.dimension(), 3);
    }

    #[tokio::test]
    async fn test_batch_respects_response_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [2.0], "index": 1},
                    {"embedding": [1.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&config_for(&server)).expect("Failed to build embedder");
        let embeddings = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .expect("Failed to embed");

        assert_eq!(embeddings, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&config_for(&server))
            .expect("Failed to build embedder")
            .with_backoff(Duration::from_millis(1));
        let err = embedder.embed("hello").await.expect_err("should fail");

        assert!(err.to_string().contains("Failed after 3 retries"));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = RemoteEmbedder::new(&config_for(&server)).expect("Failed to build embedder");
        let err = embedder.embed("hello").await.expect_err("should fail");
        assert!(err.to_string().contains("500"));
    }
}
