//! fact-rag: retrieval-augmented question answering
//!
//! Questions are embedded and matched against a small fact corpus. A match
//! at or above the similarity threshold is returned verbatim; otherwise the
//! question goes to a generative model, and if that fails a canned reply is
//! served. Every answer is tagged with its provenance.

pub mod api;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod facts;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod pipeline;

pub use api::{build_router, AppState};
pub use config::Config;
pub use error::{RagError, Result};
pub use pipeline::{Answer, QueryOrchestrator, Source};

use std::sync::Arc;
use tracing::{info, warn};

/// Build every component and index the corpus.
///
/// This is the recreate-on-boot phase: it completes before the listener
/// binds, so no query ever sees a partially built index.
pub async fn bootstrap(config: &Config) -> Result<AppState> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = facts::open_store(config, embedder).await?;

    let client = llm::create_client(&config.llm)?;
    match &client {
        Some(client) if !client.is_configured() => warn!(
            "LLM provider {} has no credential; generation will fall back to canned replies",
            client.provider()
        ),
        Some(client) => info!(
            "LLM provider ready: {} (model={})",
            client.provider(),
            client.model()
        ),
        None => info!("LLM generation disabled"),
    }

    let orchestrator = QueryOrchestrator::new(Arc::new(store), client, config);

    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
        collection: config.vector_db.collection_name.clone(),
    })
}
