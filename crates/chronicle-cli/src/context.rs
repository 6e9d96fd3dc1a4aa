//! Shared setup for commands that touch a store

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chronicle_memory::Config;
use chronicle_memory::embedding::build_provider;
use chronicle_memory::injection::Injector;
use chronicle_memory::memory::ConversationTurn;
use chronicle_memory::rerank::HttpReranker;
use chronicle_memory::retrieval::RetrievalOrchestrator;
use chronicle_memory::storage::{VectorStore, collection_id_for, open_store};

use crate::error::{CliError, CliResult};

pub struct Context {
    pub config: Config,
}

impl Context {
    /// Load the config and apply the `--data-dir` override.
    pub fn load(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> CliResult<Self> {
        let mut config = Config::load(config_path)?;
        if let Some(data_dir) = data_dir {
            config.storage.data_dir = data_dir;
        }
        Ok(Self { config })
    }

    pub async fn store(&self) -> CliResult<Arc<dyn VectorStore>> {
        let embedder = build_provider(&self.config.embedding)?;
        tracing::info!(
            "Opening {} store at {} with {} embeddings",
            self.config.storage.backend,
            self.config.storage.data_dir.display(),
            embedder.name()
        );
        Ok(open_store(&self.config.storage, embedder).await?)
    }

    pub fn orchestrator(
        &self,
        store: Arc<dyn VectorStore>,
        injector: Arc<dyn Injector>,
    ) -> CliResult<RetrievalOrchestrator> {
        let orchestrator =
            RetrievalOrchestrator::new(store, self.config.retrieval.clone(), injector);
        if !self.config.reranker.enabled {
            return Ok(orchestrator);
        }
        let reranker = HttpReranker::new(&self.config.reranker)?;
        Ok(orchestrator.with_reranker(Arc::new(reranker)))
    }
}

pub fn collection_id(conversation: &str) -> CliResult<String> {
    collection_id_for(conversation)
        .ok_or_else(|| "Conversation id must not be blank".to_string().into())
}

/// Read a JSON array of `{role, name?, content}` turns.
pub fn read_turns(path: &Path) -> CliResult<Vec<ConversationTurn>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CliError::context(format!("Failed to read turns file {}", path.display()), e)
    })?;
    let turns: Vec<ConversationTurn> = serde_json::from_str(&content)?;
    Ok(turns)
}

pub fn read_summary(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CliError::context(format!("Failed to read summary file {}", path.display()), e)
    })
}
