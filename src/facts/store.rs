//! Fact store and the in-memory vector index

use super::models::*;
use super::StoreError;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Similarity-searchable fact index
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Discard prior contents and install `facts` wholesale
    async fn recreate(&self, facts: Vec<Fact>, dims: usize) -> std::result::Result<(), StoreError>;

    /// Top `top_k` matches, most similar first, ties by ascending id
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<Match>, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn is_available(&self) -> bool;

    fn backend_name(&self) -> &'static str;
}

/// Order matches by score descending, then fact id ascending
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.fact.id.cmp(&b.fact.id))
    });
}

#[derive(Debug, Default)]
struct Snapshot {
    facts: Vec<Fact>,
}

/// Brute-force cosine index over an immutable snapshot.
///
/// `recreate` builds the new snapshot before taking the write lock, and the
/// lock only guards the pointer swap. Readers clone the `Arc` and scan
/// without holding the lock.
#[derive(Default)]
pub struct InMemoryIndex {
    snapshot: RwLock<Arc<Snapshot>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn recreate(
        &self,
        mut facts: Vec<Fact>,
        dims: usize,
    ) -> std::result::Result<(), StoreError> {
        if let Some(bad) = facts.iter().find(|f| f.embedding.len() != dims) {
            return Err(StoreError::DimensionMismatch {
                expected: dims,
                actual: bad.embedding.len(),
            });
        }
        facts.sort_by_key(|f| f.id);

        let next = Arc::new(Snapshot { facts });
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = next;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<Match>, StoreError> {
        let snapshot = self.current();

        let mut matches: Vec<Match> = snapshot
            .facts
            .iter()
            .map(|fact| Match {
                score: cosine_similarity(vector, &fact.embedding),
                fact: fact.clone(),
            })
            .collect();

        sort_matches(&mut matches);
        matches.truncate(top_k);
        Ok(matches)
    }

    fn len(&self) -> usize {
        self.current().facts.len()
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Corpus build options
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub dedup_enabled: bool,
    /// Index dimensionality required by the backend, if pinned
    pub vector_size: Option<usize>,
}

/// Fact store: shared embedder plus vector index
pub struct FactStore {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    dims: usize,
    degraded: bool,
}

impl FactStore {
    /// Embed `seeds` and recreate the index from them.
    ///
    /// Any vector whose length differs from `embedder.dims()` (or from the
    /// pinned `vector_size`) aborts the build with a configuration error.
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        seeds: Vec<FactSeed>,
        options: &StoreOptions,
    ) -> Result<Self> {
        let dims = embedder.dims();
        if let Some(size) = options.vector_size {
            if size != dims {
                return Err(RagError::Configuration(format!(
                    "Vector size {} does not match embedder dims {}",
                    size, dims
                )));
            }
        }

        let seeds = assign_ids(seeds, options.dedup_enabled)?;
        let texts: Vec<String> = seeds.iter().map(|(_, text)| text.clone()).collect();

        info!(
            "Building fact index: backend={}, facts={}, dims={}",
            index.backend_name(),
            texts.len(),
            dims
        );

        let vectors = embedder.embed_batch(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(RagError::Internal(format!(
                "Embedder returned {} vectors for {} facts",
                vectors.len(),
                texts.len()
            )));
        }

        let mut facts = Vec::with_capacity(seeds.len());
        for ((id, text), vector) in seeds.into_iter().zip(vectors) {
            if vector.len() != dims {
                return Err(RagError::Configuration(format!(
                    "Fact {} embedded to {} dims, expected {}",
                    id,
                    vector.len(),
                    dims
                )));
            }
            facts.push(Fact::new(id, text, vector));
        }

        index.recreate(facts, dims).await?;
        info!("Fact index ready: {} facts", index.len());

        Ok(Self {
            embedder,
            index,
            dims,
            degraded: false,
        })
    }

    /// Flag that the configured backend was replaced at boot
    pub fn mark_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// Embed a query with the same model used for the corpus
    pub async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        let vector = self.embedder.embed(question).await?;
        self.check_dims(&vector)?;
        Ok(vector)
    }

    /// Search the index; the query must have exactly `dims` components
    pub async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        self.check_dims(vector)?;
        let matches = self.index.search(vector, top_k).await?;
        debug!(
            "Search returned {} matches, best={:?}",
            matches.len(),
            matches.first().map(|m| m.score)
        );
        Ok(matches)
    }

    fn check_dims(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            return Err(RagError::Configuration(format!(
                "Query vector has {} dims, index expects {}",
                vector.len(),
                self.dims
            )));
        }
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn backend_name(&self) -> &'static str {
        self.index.backend_name()
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Whether the configured backend is serving; false after a boot fallback
    pub async fn is_available(&self) -> bool {
        !self.degraded && self.index.is_available().await
    }
}

/// Resolve ids (explicit, else 1-based position) and drop duplicate texts
fn assign_ids(seeds: Vec<FactSeed>, dedup: bool) -> Result<Vec<(u64, String)>> {
    let mut seen_hashes = HashSet::new();
    let mut seen_ids = HashSet::new();
    let mut out = Vec::with_capacity(seeds.len());

    for (position, seed) in seeds.into_iter().enumerate() {
        let text = seed.text.trim().to_string();
        if text.is_empty() {
            warn!("Skipping empty corpus entry at position {}", position + 1);
            continue;
        }

        if dedup && !seen_hashes.insert(Fact::compute_hash(&text)) {
            warn!("Duplicate fact dropped: {}", text);
            continue;
        }

        let id = seed.id.unwrap_or(position as u64 + 1);
        if !seen_ids.insert(id) {
            return Err(RagError::Configuration(format!("Duplicate fact id {}", id)));
        }
        out.push((id, text));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbedError, HashEmbedder};

    fn fact(id: u64, embedding: Vec<f32>) -> Fact {
        Fact::new(id, format!("fact {}", id), embedding)
    }

    #[tokio::test]
    async fn test_memory_search_orders_and_breaks_ties() {
        let index = InMemoryIndex::new();
        index
            .recreate(
                vec![
                    fact(3, vec![1.0, 0.0]),
                    fact(1, vec![1.0, 0.0]),
                    fact(2, vec![0.0, 1.0]),
                ],
                2,
            )
            .await
            .unwrap();

        let matches = index.search(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<u64> = matches.iter().map(|m| m.fact.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert!((matches[0].score - 1.0).abs() < 1e-6);

        let top = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].fact.id, 1);
    }

    #[tokio::test]
    async fn test_recreate_replaces_contents() {
        let index = InMemoryIndex::new();
        assert!(index.search(&[1.0], 1).await.unwrap().is_empty());

        index.recreate(vec![fact(1, vec![1.0]), fact(2, vec![1.0])], 1).await.unwrap();
        assert_eq!(index.len(), 2);

        index.recreate(vec![fact(7, vec![1.0])], 1).await.unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.search(&[1.0], 5).await.unwrap()[0].fact.id, 7);
    }

    #[tokio::test]
    async fn test_recreate_rejects_wrong_dims() {
        let index = InMemoryIndex::new();
        let result = index.recreate(vec![fact(1, vec![1.0, 0.0, 0.0])], 2).await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { expected: 2, actual: 3 })));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_build_dedups_and_assigns_ids() {
        let embedder = Arc::new(HashEmbedder::new(384));
        let seeds = vec![
            FactSeed::new("Om has 2 apples"),
            FactSeed::new("om has 2  apples"),
            FactSeed::new("Sahil has 3 apples"),
        ];
        let options = StoreOptions {
            dedup_enabled: true,
            vector_size: None,
        };

        let store = FactStore::build(embedder, Arc::new(InMemoryIndex::new()), seeds, &options)
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        let query = store.embed_query("Sahil apples").await.unwrap();
        let matches = store.search(&query, 2).await.unwrap();
        assert_eq!(matches[0].fact.id, 3);
        assert_eq!(matches[0].fact.text, "Sahil has 3 apples");
    }

    #[tokio::test]
    async fn test_build_rejects_pinned_vector_size() {
        let options = StoreOptions {
            dedup_enabled: true,
            vector_size: Some(128),
        };
        let result = FactStore::build(
            Arc::new(HashEmbedder::new(64)),
            Arc::new(InMemoryIndex::new()),
            default_corpus(),
            &options,
        )
        .await;
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_query_dimension_mismatch_is_configuration_error() {
        let store = FactStore::build(
            Arc::new(HashEmbedder::new(8)),
            Arc::new(InMemoryIndex::new()),
            default_corpus(),
            &StoreOptions::default(),
        )
        .await
        .unwrap();

        let result = store.search(&[1.0, 0.0], 1).await;
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_build_propagates_embedder_failure() {
        struct Offline;

        #[async_trait]
        impl Embedder for Offline {
            async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbedError> {
                Err(EmbedError::Unavailable("model not loaded".to_string()))
            }
            fn dims(&self) -> usize {
                4
            }
            fn model_name(&self) -> &str {
                "offline"
            }
        }

        let result = FactStore::build(
            Arc::new(Offline),
            Arc::new(InMemoryIndex::new()),
            default_corpus(),
            &StoreOptions::default(),
        )
        .await;
        assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
    }

    #[test]
    fn test_assign_ids_rejects_duplicate_explicit_ids() {
        let seeds = vec![
            FactSeed { id: Some(5), text: "a".into() },
            FactSeed { id: Some(5), text: "b".into() },
        ];
        assert!(assign_ids(seeds, true).is_err());

        let seeds = vec![FactSeed::new("a"), FactSeed::new(" "), FactSeed::new("c")];
        let ids: Vec<u64> = assign_ids(seeds, true)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
