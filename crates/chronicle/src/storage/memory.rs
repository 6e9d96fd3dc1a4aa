//! Process-local store with native hybrid search
//!
//! Collections live in a `DashMap`. Vector scores are cosine similarity; the
//! hybrid query fuses cosine and BM25 ranks with reciprocal rank fusion.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{BackendKind, ChunkRecord, ListOptions, ScoredRecord, StoreStats, VectorStore};
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::error::Result;
use crate::lexical::Bm25Index;
use crate::lexical::bm25::{DEFAULT_B, DEFAULT_K1};
use crate::scoring::fusion::{rank_positions, rrf_score};

const HYBRID_RRF_K: f32 = 60.0;

#[derive(Debug, Clone)]
struct StoredEntry {
    record: ChunkRecord,
    embedding: Vec<f32>,
}

pub struct InMemoryStore {
    embedder: Arc<dyn EmbeddingProvider>,
    collections: DashMap<String, Vec<StoredEntry>>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            collections: DashMap::new(),
        }
    }

    /// Snapshot of a collection's entries
    fn entries(&self, collection_id: &str) -> Vec<StoredEntry> {
        self.collections
            .get(collection_id)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    /// Cosine scores for every entry, in storage order
    async fn vector_scores(&self, entries: &[StoredEntry], text: &str) -> Result<Vec<f32>> {
        let query = self.embedder.embed(text).await?;
        Ok(entries
            .iter()
            .map(|e| cosine_similarity(&query, &e.embedding))
            .collect())
    }
}

fn top_results(
    entries: Vec<StoredEntry>,
    scores: Vec<f32>,
    top_k: usize,
    threshold: f32,
) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = entries
        .into_iter()
        .zip(scores)
        .filter(|(_, score)| *score >= threshold)
        .map(|(entry, score)| ScoredRecord {
            record: entry.record,
            score,
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn insert(&self, collection_id: &str, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut collection = self.collections.entry(collection_id.to_string()).or_default();
        for (record, embedding) in records.iter().zip(embeddings) {
            collection.retain(|e| e.record.hash != record.hash);
            collection.push(StoredEntry {
                record: record.clone(),
                embedding,
            });
        }
        debug!("Inserted {} records into {}", records.len(), collection_id);
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredRecord>> {
        let entries = self.entries(collection_id);
        if entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let scores = self.vector_scores(&entries, text).await?;
        Ok(top_results(entries, scores, top_k, threshold))
    }

    async fn hybrid_query(
        &self,
        collection_id: &str,
        text: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredRecord>> {
        let entries = self.entries(collection_id);
        if entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.vector_scores(&entries, text).await?;
        let bm25 = Bm25Index::new(entries.iter().map(|e| e.record.text.as_str()), DEFAULT_K1, DEFAULT_B)
            .scores(text);

        let vector_ranks = rank_positions(&vector);
        let bm25_ranks = rank_positions(&bm25);
        let fused: Vec<f32> = vector_ranks
            .iter()
            .zip(&bm25_ranks)
            .map(|(rv, rb)| rrf_score(*rv, *rb, HYBRID_RRF_K))
            .collect();

        Ok(top_results(entries, fused, top_k, threshold))
    }

    async fn list(&self, collection_id: &str, options: &ListOptions) -> Result<Vec<ChunkRecord>> {
        let mut records: Vec<ChunkRecord> = self
            .entries(collection_id)
            .into_iter()
            .map(|e| e.record)
            .filter(|r| options.filter.as_ref().is_none_or(|f| f.matches(r)))
            .collect();
        records.sort_by_key(|r| (r.index, r.hash));

        Ok(records
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn delete(&self, collection_id: &str, hashes: &[u64]) -> Result<usize> {
        let Some(mut collection) = self.collections.get_mut(collection_id) else {
            return Ok(0);
        };
        let before = collection.len();
        collection.retain(|e| !hashes.contains(&e.record.hash));
        Ok(before - collection.len())
    }

    async fn purge(&self, collection_id: &str) -> Result<()> {
        self.collections.remove(collection_id);
        Ok(())
    }

    async fn stats(&self, collection_id: &str) -> Result<StoreStats> {
        let entries = self.entries(collection_id);
        Ok(StoreStats::from_records(
            collection_id,
            entries.iter().map(|e| &e.record),
        ))
    }
}
