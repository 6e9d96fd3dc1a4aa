//! Embedding providers
//!
//! Stores embed chunk text on insert and query text on search through the
//! [`EmbeddingProvider`] trait. Implementations:
//! - [`LocalEmbedder`]: fastembed running in-process
//! - [`RemoteEmbedder`]: OpenAI-compatible `/embeddings` endpoint
//! - [`CachedEmbedder`]: LRU cache in front of either

pub mod cache;
pub mod local;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::error::Result;

pub use cache::CachedEmbedder;
pub use local::{LOCAL_EMBEDDING_DIMENSION, LocalEmbedder};
pub use remote::RemoteEmbedder;

/// Turns text into a dense vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Length of every vector this provider returns
    fn dimension(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Build the provider described by `config`, wrapped in a cache when enabled.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderKind::Local => Arc::new(LocalEmbedder::new()?),
        EmbeddingProviderKind::Remote => Arc::new(RemoteEmbedder::new(config)?),
    };

    if config.cache_size == 0 {
        return Ok(provider);
    }
    Ok(Arc::new(CachedEmbedder::new(provider, config.cache_size)))
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
