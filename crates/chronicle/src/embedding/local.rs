use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use super::EmbeddingProvider;
use crate::error::{ChronicleError, Result};

pub const LOCAL_EMBEDDING_DIMENSION: usize = 384;

/// fastembed `MultilingualE5Small`, run on the blocking pool.
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(InitOptions::new(FastEmbedModel::MultilingualE5Small))
            .map_err(|e| ChronicleError::Embedding(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| ChronicleError::Embedding("Embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, None)
                .map_err(|e| ChronicleError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| ChronicleError::Embedding(format!("Embedding task failed: {e}")))?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChronicleError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.to_vec()).await
    }

    fn dimension(&self) -> usize {
        LOCAL_EMBEDDING_DIMENSION
    }

    fn name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(all(test, feature = "ml-tests"))]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn test_embed_returns_correct_dimension() {
        let model = LocalEmbedder::new().expect("Failed to load model");
        let embedding = model.embed("Hello, world!").await.expect("Failed to embed");
        assert_eq!(embedding.len(), LOCAL_EMBEDDING_DIMENSION);
    }

    #[tokio::test]
    async fn test_similar_texts_have_high_similarity() {
        let model = LocalEmbedder::new().expect("Failed to load model");

        let emb1 = model.embed("The bell rang at midnight").await.expect("Failed to embed");
        let emb2 = model.embed("At midnight the bell was ringing").await.expect("Failed to embed");
        let emb3 = model.embed("Quarterly tax filing deadlines").await.expect("Failed to embed");

        let sim_similar = cosine_similarity(&emb1, &emb2);
        let sim_different = cosine_similarity(&emb1, &emb3);
        assert!(
            sim_similar > sim_different,
            "Similar texts ({sim_similar:.3}) should score above unrelated ones ({sim_different:.3})"
        );
    }

    #[tokio::test]
    async fn test_batch_embedding() {
        let model = LocalEmbedder::new().expect("Failed to load model");
        let texts = vec!["First".to_string(), "Second".to_string(), "Third".to_string()];
        let embeddings = model.embed_batch(&texts).await.expect("Failed to embed batch");
        assert_eq!(embeddings.len(), 3);
    }
}
