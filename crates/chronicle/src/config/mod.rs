use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ChronicleError, Result};
use crate::storage::backend::BackendKind;

/// Main configuration structure for Chronicle
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Retrieval pipeline configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// External reranker configuration
    #[serde(default)]
    pub reranker: RerankerConfig,
    /// Reconciliation configuration
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

impl Config {
    /// Load configuration from `path`, or from the first default location that exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".chronicle").join("config.toml")),
            dirs::config_dir().map(|c| c.join("chronicle").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChronicleError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ChronicleError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for persisted collections
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Which store implementation to use
    #[serde(default)]
    pub backend: BackendKind,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: BackendKind::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".chronicle"))
        .unwrap_or_else(|| PathBuf::from(".chronicle"))
}

/// Embedding provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// fastembed model running in-process
    #[default]
    Local,
    /// OpenAI-compatible HTTP endpoint
    Remote,
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Upstream kind reported in logs (e.g. "openai", "ollama")
    #[serde(default = "default_embedding_source")]
    pub source: String,
    /// Model identifier for remote API
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL of the remote API; `/embeddings` is appended
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of embeddings kept in the LRU cache (0 disables it)
    #[serde(default = "default_embedding_cache_size")]
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            source: default_embedding_source(),
            model: default_embedding_model(),
            api_url: String::new(),
            api_key_env: default_embedding_api_key_env(),
            timeout_secs: default_embedding_timeout_secs(),
            cache_size: default_embedding_cache_size(),
        }
    }
}

fn default_embedding_source() -> String {
    "openai".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_api_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_embedding_cache_size() -> usize {
    1024
}

/// How candidates are scored after retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    /// Prior score plus keyword overlap boost
    Keyword,
    /// Batch-normalized BM25 alone
    Bm25,
    /// `alpha * prior + beta * bm25`
    Blended,
    /// Vector and BM25 rank fusion
    #[default]
    Hybrid,
}

/// Client-side fusion strategy for hybrid scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    /// Reciprocal rank fusion
    #[default]
    Rrf,
    /// Min-max normalized weighted sum
    Weighted,
}

/// Retrieval pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Master switch for retrieval and injection
    #[serde(default = "default_retrieval_enabled")]
    pub enabled: bool,
    /// Number of chunks injected per pass
    #[serde(default = "default_insert_count")]
    pub insert_count: usize,
    /// Number of recent turns used to build the query
    #[serde(default = "default_query_turns")]
    pub query_turns: usize,
    /// Recent messages that retrieved chunks must not echo
    #[serde(default = "default_protected_messages")]
    pub protected_messages: usize,
    /// Minimum score a candidate needs after scoring
    #[serde(default)]
    pub score_threshold: f32,
    /// Injection template; `{{text}}` is replaced by the chunk texts
    #[serde(default = "default_template")]
    pub template: String,
    /// Overrides the backend's overfetch multiplier
    #[serde(default)]
    pub overfetch: Option<usize>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub scene_expansion: SceneExpansionConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: default_retrieval_enabled(),
            insert_count: default_insert_count(),
            query_turns: default_query_turns(),
            protected_messages: default_protected_messages(),
            score_threshold: 0.0,
            template: default_template(),
            overfetch: None,
            scoring: ScoringConfig::default(),
            scene_expansion: SceneExpansionConfig::default(),
        }
    }
}

fn default_retrieval_enabled() -> bool {
    true
}

fn default_insert_count() -> usize {
    8
}

fn default_query_turns() -> usize {
    2
}

fn default_protected_messages() -> usize {
    4
}

fn default_template() -> String {
    "[Past events]\n{{text}}".to_string()
}

/// Scoring weights and constants
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub method: ScoringMethod,
    #[serde(default)]
    pub fusion: FusionMethod,
    /// RRF rank constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Weight of the prior (vector) score
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Weight of the BM25 score
    #[serde(default = "default_beta")]
    pub beta: f32,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f32,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f32,
    /// Boost per query token found in a chunk's keyword list
    #[serde(default = "default_keyword_field_boost")]
    pub keyword_field_boost: f32,
    /// Boost per query token found in a chunk's text
    #[serde(default = "default_keyword_token_boost")]
    pub keyword_token_boost: f32,
    /// Boost per query token only partially matching a chunk token
    #[serde(default = "default_keyword_partial_boost")]
    pub keyword_partial_boost: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            method: ScoringMethod::default(),
            fusion: FusionMethod::default(),
            rrf_k: default_rrf_k(),
            alpha: default_alpha(),
            beta: default_beta(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            keyword_field_boost: default_keyword_field_boost(),
            keyword_token_boost: default_keyword_token_boost(),
            keyword_partial_boost: default_keyword_partial_boost(),
        }
    }
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_alpha() -> f32 {
    0.4
}

fn default_beta() -> f32 {
    0.6
}

fn default_bm25_k1() -> f32 {
    1.8
}

fn default_bm25_b() -> f32 {
    0.5
}

fn default_keyword_field_boost() -> f32 {
    0.08
}

fn default_keyword_token_boost() -> f32 {
    0.03
}

fn default_keyword_partial_boost() -> f32 {
    0.03
}

/// Same-scene expansion after thresholding
#[derive(Debug, Clone, Deserialize)]
pub struct SceneExpansionConfig {
    #[serde(default = "default_scene_expansion_enabled")]
    pub enabled: bool,
    /// Maximum number of chunks added by expansion per pass
    #[serde(default = "default_scene_expansion_max_chunks")]
    pub max_chunks: usize,
}

impl Default for SceneExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: default_scene_expansion_enabled(),
            max_chunks: default_scene_expansion_max_chunks(),
        }
    }
}

fn default_scene_expansion_enabled() -> bool {
    true
}

fn default_scene_expansion_max_chunks() -> usize {
    6
}

/// Reranker transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RerankMode {
    /// POST to a proxy endpoint that forwards the body upstream
    Proxied,
    /// POST straight to the provider with a bearer token
    #[default]
    Direct,
}

/// External reranker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RerankerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: RerankMode,
    /// Proxy URL used in proxied mode
    #[serde(default)]
    pub proxy_url: String,
    /// Provider base URL used in direct mode
    #[serde(default)]
    pub base_url: String,
    /// Path appended to `base_url`
    #[serde(default = "default_rerank_suffix")]
    pub suffix: String,
    /// Environment variable name for API key
    #[serde(default = "default_rerank_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_rerank_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_rerank_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: RerankMode::default(),
            proxy_url: String::new(),
            base_url: String::new(),
            suffix: default_rerank_suffix(),
            api_key_env: default_rerank_api_key_env(),
            model: default_rerank_model(),
            timeout_secs: default_rerank_timeout_secs(),
        }
    }
}

fn default_rerank_suffix() -> String {
    "/rerank".to_string()
}

fn default_rerank_api_key_env() -> String {
    "RERANK_API_KEY".to_string()
}

fn default_rerank_model() -> String {
    "rerank-v3.5".to_string()
}

fn default_rerank_timeout_secs() -> u64 {
    30
}

/// Reconciliation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Page size when reading the existing store
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::LanceDb);
        assert!(config.retrieval.enabled);
        assert_eq!(config.retrieval.insert_count, 8);
        assert_eq!(config.retrieval.query_turns, 2);
        assert_eq!(config.retrieval.protected_messages, 4);
        assert_eq!(config.retrieval.score_threshold, 0.0);
        assert_eq!(config.retrieval.template, "[Past events]\n{{text}}");
        assert!(config.retrieval.overfetch.is_none());
        assert!(!config.reranker.enabled);
        assert_eq!(config.lifecycle.page_size, 500);
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Local);
    }

    #[test]
    fn test_scoring_defaults() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.method, ScoringMethod::Hybrid);
        assert_eq!(scoring.fusion, FusionMethod::Rrf);
        assert!((scoring.rrf_k - 60.0).abs() < f32::EPSILON);
        assert!((scoring.alpha - 0.4).abs() < f32::EPSILON);
        assert!((scoring.beta - 0.6).abs() < f32::EPSILON);
        assert!((scoring.bm25_k1 - 1.8).abs() < f32::EPSILON);
        assert!((scoring.bm25_b - 0.5).abs() < f32::EPSILON);
        assert!((scoring.keyword_field_boost - 0.08).abs() < f32::EPSILON);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/chronicle"
backend = "memory"

[embedding]
provider = "remote"
source = "ollama"
model = "nomic-embed-text"
api_url = "http://localhost:11434/v1"

[retrieval]
insert_count = 12
score_threshold = 0.25
template = "Memories:\n{{text}}"
overfetch = 3

[retrieval.scoring]
method = "blended"
fusion = "weighted"
alpha = 0.5

[retrieval.scene_expansion]
enabled = false

[reranker]
enabled = true
mode = "proxied"
proxy_url = "http://localhost:8000/api/rerank"

[lifecycle]
page_size = 100
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/chronicle"));
        assert_eq!(config.storage.backend, BackendKind::Memory);

        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Remote);
        assert_eq!(config.embedding.source, "ollama");
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.embedding.api_key_env, "EMBEDDING_API_KEY"); // default

        assert_eq!(config.retrieval.insert_count, 12);
        assert!((config.retrieval.score_threshold - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.template, "Memories:\n{{text}}");
        assert_eq!(config.retrieval.overfetch, Some(3));
        assert_eq!(config.retrieval.query_turns, 2); // default

        assert_eq!(config.retrieval.scoring.method, ScoringMethod::Blended);
        assert_eq!(config.retrieval.scoring.fusion, FusionMethod::Weighted);
        assert!((config.retrieval.scoring.alpha - 0.5).abs() < f32::EPSILON);
        assert!((config.retrieval.scoring.beta - 0.6).abs() < f32::EPSILON);

        assert!(!config.retrieval.scene_expansion.enabled);
        assert_eq!(config.retrieval.scene_expansion.max_chunks, 6);

        assert!(config.reranker.enabled);
        assert_eq!(config.reranker.mode, RerankMode::Proxied);
        assert_eq!(config.reranker.suffix, "/rerank");

        assert_eq!(config.lifecycle.page_size, 100);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[retrieval]
enabled = false
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse partial TOML");
        assert!(!config.retrieval.enabled);
        assert_eq!(config.retrieval.insert_count, 8);
        assert_eq!(config.storage.backend, BackendKind::LanceDb);
    }

    #[test]
    fn test_invalid_enum_rejected() {
        let err = Config::from_toml("[retrieval.scoring]\nmethod = \"magic\"\n")
            .expect_err("unknown scoring method should fail");
        assert!(matches!(err, ChronicleError::Config(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[lifecycle]\npage_size = 42\n").expect("Failed to write config");

        let config = Config::load(Some(&path)).expect("Failed to load config");
        assert_eq!(config.lifecycle.page_size, 42);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/chronicle.toml")))
            .expect_err("missing file should fail");
        assert!(matches!(err, ChronicleError::Config(_)));
    }
}
