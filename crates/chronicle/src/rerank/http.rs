//! HTTP reranker transports
//!
//! Proxied mode posts the request body to a proxy that forwards it upstream.
//! Direct mode posts to `base_url + suffix` with a bearer key.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::RerankerService;
use crate::config::{RerankMode, RerankerConfig};
use crate::error::{ChronicleError, Result};

const MAX_RETRIES: u32 = 3;

/// Where rerank requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerankTransport {
    Proxied { url: String },
    Direct { base_url: String, suffix: String },
}

impl RerankTransport {
    pub fn from_config(config: &RerankerConfig) -> Result<Self> {
        let transport = match config.mode {
            RerankMode::Proxied => {
                if config.proxy_url.trim().is_empty() {
                    return Err(ChronicleError::Config(
                        "reranker.proxy_url is required in proxied mode".to_string(),
                    ));
                }
                RerankTransport::Proxied {
                    url: config.proxy_url.clone(),
                }
            }
            RerankMode::Direct => {
                if config.base_url.trim().is_empty() {
                    return Err(ChronicleError::Config(
                        "reranker.base_url is required in direct mode".to_string(),
                    ));
                }
                RerankTransport::Direct {
                    base_url: config.base_url.clone(),
                    suffix: config.suffix.clone(),
                }
            }
        };
        url::Url::parse(&transport.endpoint())
            .map_err(|e| ChronicleError::Config(format!("Invalid reranker URL: {e}")))?;
        Ok(transport)
    }

    pub fn endpoint(&self) -> String {
        match self {
            RerankTransport::Proxied { url } => url.clone(),
            RerankTransport::Direct { base_url, suffix } => {
                format!("{}{}", base_url.trim_end_matches('/'), suffix)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

/// Reranker speaking the common `{model, query, documents, top_n}` protocol
#[derive(Debug)]
pub struct HttpReranker {
    client: Client,
    transport: RerankTransport,
    model: String,
    api_key: Option<String>,
    initial_backoff: Duration,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let transport = RerankTransport::from_config(config)?;

        let api_key = match transport {
            RerankTransport::Direct { .. } => {
                let key = env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
                if key.is_none() {
                    warn!(
                        "Reranker API key env var '{}' not set, sending unauthenticated requests",
                        config.api_key_env
                    );
                }
                key
            }
            RerankTransport::Proxied { .. } => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChronicleError::Rerank(e.to_string()))?;

        info!(
            "HttpReranker initialized with model: {}, endpoint: {}",
            config.model,
            transport.endpoint()
        );

        Ok(Self {
            client,
            transport,
            model: config.model.clone(),
            api_key,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Override the first retry delay (doubles per attempt)
    pub fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn transport(&self) -> &RerankTransport {
        &self.transport
    }
}

#[async_trait]
impl RerankerService for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Value> {
        let url = self.transport.endpoint();
        let request = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: documents.len(),
        };
        debug!("Reranking {} documents at: {}", documents.len(), url);

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
                            "Reranker rate limited on attempt {}/{}, waiting {:?}",
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
                        return Err(ChronicleError::Rerank(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    return response
                        .json()
                        .await
                        .map_err(|e| ChronicleError::Rerank(format!("Invalid response: {e}")));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if !e.is_connect() {
                        return Err(ChronicleError::Rerank(err_msg));
                    }
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Reranker connect failed on attempt {}/{}, retrying: {}",
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

        Err(ChronicleError::Rerank(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
