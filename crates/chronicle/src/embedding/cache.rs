use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;

use super::EmbeddingProvider;
use crate::error::Result;

/// LRU cache of embeddings keyed by exact input text.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn cached(&self, text: &str) -> Option<Vec<f32>> {
        self.cache.lock().ok()?.get(text).cloned()
    }

    fn remember(&self, text: &str, embedding: &[f32]) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text.to_string(), embedding.to_vec());
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cached(text) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.remember(text, &embedding);
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = texts.iter().map(|t| self.cached(t)).collect();
        let missing: Vec<String> = texts
            .iter()
            .zip(&results)
            .filter(|(_, hit)| hit.is_none())
            .map(|(t, _)| t.clone())
            .collect();

        if !missing.is_empty() {
            let fresh = self.inner.embed_batch(&missing).await?;
            let mut fresh = missing.iter().zip(fresh);
            for slot in results.iter_mut().filter(|r| r.is_none()) {
                if let Some((text, embedding)) = fresh.next() {
                    self.remember(text, &embedding);
                    *slot = Some(embedding);
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
