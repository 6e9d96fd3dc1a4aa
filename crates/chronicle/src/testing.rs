//! Test utilities for chronicle - deterministic embedders and store fakes
//!
//! Everything here runs without model downloads or network access.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use crate::embedding::EmbeddingProvider;
use crate::error::{ChronicleError, Result};
use crate::lexical::tokenize;

pub const BAG_OF_WORDS_DIMENSION: usize = 256;

/// Hashed bag-of-words embedder.
///
/// Each stemmed token bumps one bucket and the vector is L2-normalized, so
/// texts sharing vocabulary have high cosine similarity.
#[derive(Debug, Clone, Default)]
pub struct BagOfWordsEmbedder;

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; BAG_OF_WORDS_DIMENSION];
        for token in tokenize(text) {
            let bucket = (xxh3_64(token.as_bytes()) % BAG_OF_WORDS_DIMENSION as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        BAG_OF_WORDS_DIMENSION
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// Embedder that fails on demand, for exercising transport-failure paths.
#[derive(Debug, Default)]
pub struct FlakyEmbedder {
    inner: BagOfWordsEmbedder,
    failing: AtomicBool,
}

impl FlakyEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChronicleError::Embedding("embedding service unavailable".to_string()));
        }
        Ok(self.inner.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        BAG_OF_WORDS_DIMENSION
    }

    fn name(&self) -> &str {
        "flaky"
    }
}
