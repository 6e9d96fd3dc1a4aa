//! Vector store contract and implementations
//!
//! Collections hold [`ChunkRecord`]s, the wire shape of a memory chunk. The
//! lifecycle manager is the only writer; retrieval reads through `query`,
//! `hybrid_query` and `list`.

pub mod backend;
pub mod filter;
pub mod lance;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::StorageConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{ChronicleError, Result};
use crate::memory::types::{ChunkMetadata, MemoryChunk};

pub use backend::{BackendKind, BackendProfile, QueryParams};
pub use filter::MetadataFilter;
pub use lance::LanceStore;
pub use memory::InMemoryStore;

/// Stored form of a chunk: `{hash, text, index, metadata}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub hash: u64,
    pub text: String,
    pub index: u64,
    pub metadata: Map<String, Value>,
}

impl ChunkRecord {
    pub fn behavior(&self) -> Option<&str> {
        self.metadata.get("chunkBehavior").and_then(Value::as_str)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn scene_code(&self) -> Option<&str> {
        self.metadata_str("sceneCode")
    }

    pub fn section_type(&self) -> Option<&str> {
        self.metadata_str("sectionType")
    }

    pub fn entity_key(&self) -> Option<&str> {
        self.metadata_str("entityKey")
    }
}

impl TryFrom<&MemoryChunk> for ChunkRecord {
    type Error = ChronicleError;

    fn try_from(chunk: &MemoryChunk) -> Result<Self> {
        let metadata = match serde_json::to_value(&chunk.metadata)? {
            Value::Object(map) => map,
            other => {
                return Err(ChronicleError::Serialization(format!(
                    "Chunk metadata serialized to non-object: {other}"
                )));
            }
        };
        Ok(Self {
            hash: chunk.hash,
            text: chunk.text.clone(),
            index: chunk.position_index,
            metadata,
        })
    }
}

impl TryFrom<ChunkRecord> for MemoryChunk {
    type Error = ChronicleError;

    /// Keeps the stored hash rather than recomputing it.
    fn try_from(record: ChunkRecord) -> Result<Self> {
        let metadata: ChunkMetadata = serde_json::from_value(Value::Object(record.metadata))?;
        Ok(MemoryChunk {
            hash: record.hash,
            text: record.text,
            position_index: record.index,
            metadata,
        })
    }
}

/// A record returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: ChunkRecord,
    pub score: f32,
}

/// Pagination and filtering for [`VectorStore::list`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub offset: usize,
    pub limit: Option<usize>,
    pub filter: Option<MetadataFilter>,
}

impl ListOptions {
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Collection statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub collection_id: String,
    pub total_chunks: usize,
    /// Chunk counts keyed by behavior tag
    pub by_behavior: BTreeMap<String, usize>,
}

impl StoreStats {
    pub fn from_records<'a>(
        collection_id: &str,
        records: impl IntoIterator<Item = &'a ChunkRecord>,
    ) -> Self {
        let mut stats = StoreStats {
            collection_id: collection_id.to_string(),
            ..Default::default()
        };
        for record in records {
            stats.total_chunks += 1;
            let behavior = record.behavior().unwrap_or("unknown").to_string();
            *stats.by_behavior.entry(behavior).or_insert(0) += 1;
        }
        stats
    }
}

/// Persistent chunk collections with similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Insert records; a record whose hash is already stored replaces it.
    async fn insert(&self, collection_id: &str, records: &[ChunkRecord]) -> Result<()>;

    /// Vector similarity search, best first, scores at or above `threshold`.
    async fn query(
        &self,
        collection_id: &str,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredRecord>>;

    /// Fused vector and lexical search. Backends without native support fall
    /// back to [`VectorStore::query`].
    async fn hybrid_query(
        &self,
        collection_id: &str,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredRecord>> {
        self.query(collection_id, text, top_k, threshold).await
    }

    async fn list(&self, collection_id: &str, options: &ListOptions) -> Result<Vec<ChunkRecord>>;

    /// Delete records by hash, returning how many were removed.
    async fn delete(&self, collection_id: &str, hashes: &[u64]) -> Result<usize>;

    /// Remove every record in the collection.
    async fn purge(&self, collection_id: &str) -> Result<()>;

    async fn stats(&self, collection_id: &str) -> Result<StoreStats>;
}

/// Open the configured backend.
pub async fn open_store(
    config: &StorageConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn VectorStore>> {
    match config.backend {
        BackendKind::LanceDb => {
            std::fs::create_dir_all(&config.data_dir)?;
            Ok(Arc::new(LanceStore::connect(&config.data_dir, embedder).await?))
        }
        BackendKind::Memory => Ok(Arc::new(InMemoryStore::new(embedder))),
    }
}

/// Collection identity for a conversation; `None` when the id is blank.
pub fn collection_id_for(conversation_id: &str) -> Option<String> {
    let trimmed = conversation_id.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(format!("chronicle_{}", sanitize_identifier(trimmed)))
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_identifier(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
