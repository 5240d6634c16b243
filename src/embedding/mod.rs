//! Text embedding
//!
//! One [`Embedder`] instance is shared by corpus indexing and query embedding;
//! using different instances for the two would make scores meaningless.
//!
//! - [`HashEmbedder`]: local feature hashing, no model download, never fails
//! - [`HttpEmbedder`]: OpenAI-compatible `/embeddings` endpoint
//! - [`CachedEmbedder`]: bounded cache in front of either

pub mod cached;
pub mod hashing;
pub mod http;

pub use cached::CachedEmbedder;
pub use hashing::HashEmbedder;
pub use http::HttpEmbedder;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Embedding errors
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("Embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Maps text to a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text; identical input yields an identical vector
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbedError>;

    /// Embed a batch, preserving input order
    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dims(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the embedder selected by `config.provider`
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider.as_str() {
        "hash" => Arc::new(HashEmbedder::new(config.dims)),
        "http" => Arc::new(HttpEmbedder::new(config).map_err(RagError::from)?),
        other => {
            return Err(RagError::Configuration(format!(
                "Unknown embedding provider: {}",
                other
            )))
        }
    };

    info!(
        "Embedder ready: model={}, dims={}",
        embedder.model_name(),
        embedder.dims()
    );

    if config.cache_size > 0 {
        Ok(Arc::new(CachedEmbedder::new(embedder, config.cache_size)))
    } else {
        Ok(embedder)
    }
}

/// Cosine similarity in `[-1, 1]`; zero for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_create_embedder() {
        let config = EmbeddingConfig::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dims(), 384);

        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..Default::default()
        };
        assert!(matches!(create_embedder(&config), Err(RagError::Configuration(_))));
    }
}
