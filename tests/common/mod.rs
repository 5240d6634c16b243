//! Shared test doubles

#![allow(dead_code)]

use async_trait::async_trait;
use fact_rag::config::Config;
use fact_rag::embedding::{EmbedError, Embedder, HashEmbedder};
use fact_rag::facts::{
    default_corpus, Fact, FactSeed, FactStore, InMemoryIndex, Match, StoreError, StoreOptions,
    VectorIndex,
};
use fact_rag::llm::{FixedSelector, GenerationError, GenerativeClient};
use fact_rag::{AppState, QueryOrchestrator};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const VOCABULARY: &[&str] = &[
    "om", "pavan", "sahil", "apple", "2", "82", "3", "capital", "france", "court", "bail",
];

/// One dimension per vocabulary word; unknown words are ignored
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbedError::Unavailable("model not loaded".to_string()));
        }

        let mut vector = vec![0.0; VOCABULARY.len()];
        for token in HashEmbedder::tokenize(text) {
            if let Some(idx) = VOCABULARY.iter().position(|w| *w == token) {
                vector[idx] += 1.0;
            }
        }
        Ok(vector)
    }

    fn dims(&self) -> usize {
        VOCABULARY.len()
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// In-memory index that can be switched offline
pub struct FlakyIndex {
    pub inner: InMemoryIndex,
    pub fail: AtomicBool,
}

impl FlakyIndex {
    pub fn new() -> Self {
        Self {
            inner: InMemoryIndex::new(),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn recreate(&self, facts: Vec<Fact>, dims: usize) -> Result<(), StoreError> {
        self.inner.recreate(facts, dims).await
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>, StoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.search(vector, top_k).await
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    async fn is_available(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Generative client with a fixed reply
pub struct ScriptedClient {
    pub calls: AtomicUsize,
    pub contexts: std::sync::Mutex<Vec<Option<String>>>,
    reply: Result<String, String>,
}

impl ScriptedClient {
    pub fn answering(text: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            contexts: std::sync::Mutex::new(Vec::new()),
            reply: Ok(text.to_string()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            contexts: std::sync::Mutex::new(Vec::new()),
            reply: Err(reason.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeClient for ScriptedClient {
    async fn generate(
        &self,
        _question: &str,
        context: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.map(String::from));
        self.reply
            .clone()
            .map_err(GenerationError::UpstreamError)
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Test pipeline with handles to every double
pub struct Harness {
    pub embedder: Arc<KeywordEmbedder>,
    pub index: Arc<FlakyIndex>,
    pub client: Option<Arc<ScriptedClient>>,
    pub orchestrator: Arc<QueryOrchestrator>,
}

impl Harness {
    pub async fn new(client: Option<ScriptedClient>) -> Self {
        Self::with_corpus(client, default_corpus(), Config::default()).await
    }

    pub async fn with_corpus(
        client: Option<ScriptedClient>,
        seeds: Vec<FactSeed>,
        config: Config,
    ) -> Self {
        let embedder = Arc::new(KeywordEmbedder::new());
        let index = Arc::new(FlakyIndex::new());
        let store = FactStore::build(
            embedder.clone(),
            index.clone(),
            seeds,
            &StoreOptions {
                dedup_enabled: true,
                vector_size: None,
            },
        )
        .await
        .expect("corpus builds");

        let client = client.map(Arc::new);
        let dyn_client = client.clone().map(|c| c as Arc<dyn GenerativeClient>);
        let orchestrator = QueryOrchestrator::new(Arc::new(store), dyn_client, &config)
            .with_selector(Arc::new(FixedSelector(0)));

        Self {
            embedder,
            index,
            client,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            orchestrator: self.orchestrator.clone(),
            collection: "apples".to_string(),
        }
    }

    pub fn client_calls(&self) -> usize {
        self.client.as_ref().map(|c| c.calls()).unwrap_or(0)
    }
}
