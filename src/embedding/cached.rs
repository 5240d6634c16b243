//! Bounded cache in front of an embedder

use super::{EmbedError, Embedder};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;

/// Caches vectors by exact input text.
///
/// Only successful embeddings are cached, so a transient failure is retried
/// on the next request.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_entries: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(max_entries),
        }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(hit) = self.cache.get(text).await {
            return Ok(hit.as_ref().clone());
        }

        let vector = self.inner.embed(text).await?;
        self.cache
            .insert(text.to_string(), Arc::new(vector.clone()))
            .await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.inner.embed_batch(texts).await
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbedError::Unavailable("offline".to_string()));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dims(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_hit_skips_inner() {
        let inner = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0), fail: false });
        let cached = CachedEmbedder::new(inner.clone(), 16);

        let a = cached.embed("apples").await.unwrap();
        let b = cached.embed("apples").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.dims(), 2);
        assert_eq!(cached.model_name(), "counting");
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0), fail: true });
        let cached = CachedEmbedder::new(inner.clone(), 16);

        assert!(cached.embed("apples").await.is_err());
        assert!(cached.embed("apples").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
