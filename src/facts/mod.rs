//! Fact store
//!
//! A small corpus of fact strings, embedded once at boot and held in a
//! similarity-searchable index:
//! - Recreate-on-boot: the index is dropped and rebuilt at every start
//! - Hash-based deduplication of corpus entries
//! - In-memory or Qdrant backend, with fallback to memory if Qdrant is down

pub mod models;
pub mod qdrant;
pub mod store;

pub use models::{default_corpus, load_corpus, Fact, FactSeed, Match, DEFAULT_CORPUS};
pub use qdrant::QdrantIndex;
pub use store::{FactStore, InMemoryIndex, StoreOptions, VectorIndex};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Vector index errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Build the fact store selected by `config.vector_db.backend`.
///
/// If the Qdrant backend cannot be reached the corpus is indexed in memory
/// instead and the store reports itself unavailable.
pub async fn open_store(config: &Config, embedder: Arc<dyn Embedder>) -> Result<FactStore> {
    let seeds = match &config.facts.corpus_path {
        Some(path) => load_corpus(path)?,
        None => default_corpus(),
    };

    let options = StoreOptions {
        dedup_enabled: config.facts.dedup_enabled,
        vector_size: config.vector_db.vector_size,
    };

    match config.vector_db.backend.as_str() {
        "memory" => {
            FactStore::build(embedder, Arc::new(InMemoryIndex::new()), seeds, &options).await
        }
        "qdrant" => {
            let attempt = match QdrantIndex::new(&config.vector_db) {
                Ok(index) => {
                    info!(
                        "Using Qdrant at {} (collection={})",
                        config.vector_db.url,
                        index.collection_name()
                    );
                    FactStore::build(embedder.clone(), Arc::new(index), seeds.clone(), &options)
                        .await
                }
                Err(e) => Err(RagError::from(e)),
            };

            match attempt {
                Err(RagError::StoreUnavailable(reason)) => {
                    warn!("Qdrant unavailable ({}), indexing facts in memory", reason);
                    let store =
                        FactStore::build(embedder, Arc::new(InMemoryIndex::new()), seeds, &options)
                            .await?;
                    Ok(store.mark_degraded())
                }
                other => other,
            }
        }
        other => Err(RagError::Configuration(format!(
            "Unknown vector store backend: {}",
            other
        ))),
    }
}
