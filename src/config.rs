//! Service configuration
//!
//! Loading order: `.env` (dotenvy) → optional TOML file → `FACT_RAG__SECTION__KEY`
//! environment overrides → the plain variables understood by earlier
//! deployments (`GEMINI_API_KEY`, `QDRANT_HOST`, `CORS_ALLOWED_ORIGINS`, ...).

use crate::error::{RagError, Result};
use crate::llm::LlmConfig;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "FACT_RAG_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    #[serde(default)]
    pub facts: FactsConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed by the CORS layer
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_allowed_origins: default_cors_origins(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// `hash` (local feature hashing) or `http` (OpenAI-compatible endpoint)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<SecretString>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
    /// Entries kept in the query embedding cache, 0 disables it
    #[serde(default = "default_embedding_cache_size")]
    pub cache_size: u64,
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}

fn default_embedding_model() -> String {
    "feature-hash-v1".to_string()
}

fn default_embedding_dims() -> usize {
    384
}

fn default_embedding_timeout_ms() -> u64 {
    5000
}

fn default_embedding_cache_size() -> u64 {
    1024
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_url: None,
            api_token: None,
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            timeout_ms: default_embedding_timeout_ms(),
            cache_size: default_embedding_cache_size(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VectorDbConfig {
    /// `memory` or `qdrant`
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection_name: String,
    /// Expected vector size; must agree with the embedder when set
    #[serde(default)]
    pub vector_size: Option<usize>,
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection() -> String {
    "apples".to_string()
}

fn default_search_timeout_ms() -> u64 {
    3000
}

fn default_top_k() -> usize {
    1
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_qdrant_url(),
            collection_name: default_collection(),
            vector_size: None,
            timeout_ms: default_search_timeout_ms(),
            top_k: default_top_k(),
        }
    }
}

impl VectorDbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Fact corpus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FactsConfig {
    /// JSON file with `[{"id": 1, "text": "..."}]`; built-in corpus when unset
    #[serde(default)]
    pub corpus_path: Option<PathBuf>,
    #[serde(default = "default_dedup")]
    pub dedup_enabled: bool,
}

fn default_dedup() -> bool {
    true
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            corpus_path: None,
            dedup_enabled: default_dedup(),
        }
    }
}

/// Relevance gate configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Inclusive minimum cosine similarity for a direct answer
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Whether rejected restricted-domain questions may reach the generative client
    #[serde(default)]
    pub fallback_to_llm_for_restricted_domain: bool,
    #[serde(default = "default_restricted_keywords")]
    pub restricted_keywords: Vec<String>,
    /// Inclusive similarity at which a restricted question is still answered from the corpus
    #[serde(default = "default_restricted_min_similarity")]
    pub restricted_min_similarity: f32,
    /// Pass the best (rejected) match to the generative client as context
    #[serde(default = "default_include_context")]
    pub include_context: bool,
    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,
}

fn default_min_similarity() -> f32 {
    0.7
}

fn default_restricted_min_similarity() -> f32 {
    0.45
}

fn default_include_context() -> bool {
    true
}

fn default_max_question_chars() -> usize {
    2000
}

fn default_restricted_keywords() -> Vec<String> {
    [
        "law", "case", "court", "act", "section", "judgment", "verdict", "appeal",
        "sentence", "advocate", "bail", "petition", "hearing", "order", "statute", "liable",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            fallback_to_llm_for_restricted_domain: false,
            restricted_keywords: default_restricted_keywords(),
            restricted_min_similarity: default_restricted_min_similarity(),
            include_context: default_include_context(),
            max_question_chars: default_max_question_chars(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the file named by `FACT_RAG_CONFIG`
    /// (default `config.toml`, optional) and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        Self::from_file(&path)
    }

    /// Load configuration from a TOML file plus environment overrides
    pub fn from_file(path: &str) -> Result<Self> {
        debug!("Loading configuration from {}", path);

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("FACT_RAG")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the plain environment variables used by earlier deployments
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origins) = lookup("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(val) = lookup("FALLBACK_TO_LLM_FOR_LEGAL") {
            self.gate.fallback_to_llm_for_restricted_domain = parse_flag(&val);
        }

        if let Some(host) = lookup("QDRANT_HOST") {
            let port = lookup("QDRANT_PORT")
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(6334);
            self.vector_db.backend = "qdrant".to_string();
            self.vector_db.url = format!("http://{}:{}", host, port);
        }

        if let Some(collection) = lookup("QDRANT_COLLECTION") {
            self.vector_db.collection_name = collection;
        }

        self.llm = std::mem::take(&mut self.llm).from_lookup(&lookup);
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.gate.min_similarity) {
            return Err(RagError::Configuration(format!(
                "gate.min_similarity must be within [-1, 1], got {}",
                self.gate.min_similarity
            )));
        }

        if !(-1.0..=1.0).contains(&self.gate.restricted_min_similarity) {
            return Err(RagError::Configuration(format!(
                "gate.restricted_min_similarity must be within [-1, 1], got {}",
                self.gate.restricted_min_similarity
            )));
        }

        if self.gate.max_question_chars == 0 {
            return Err(RagError::Configuration(
                "gate.max_question_chars must be positive".to_string(),
            ));
        }

        if self.embedding.dims == 0 {
            return Err(RagError::Configuration("embedding.dims must be positive".to_string()));
        }

        if let Some(size) = self.vector_db.vector_size {
            if size != self.embedding.dims {
                return Err(RagError::Configuration(format!(
                    "vector_db.vector_size {} does not match embedding.dims {}",
                    size, self.embedding.dims
                )));
            }
        }

        if !matches!(self.embedding.provider.as_str(), "hash" | "http") {
            return Err(RagError::Configuration(format!(
                "Unknown embedding provider: {}",
                self.embedding.provider
            )));
        }

        if self.embedding.provider == "http" && self.embedding.api_url.is_none() {
            return Err(RagError::Configuration(
                "embedding.api_url is required for the http provider".to_string(),
            ));
        }

        if !matches!(self.vector_db.backend.as_str(), "memory" | "qdrant") {
            return Err(RagError::Configuration(format!(
                "Unknown vector_db backend: {}",
                self.vector_db.backend
            )));
        }

        if self.vector_db.top_k == 0 {
            return Err(RagError::Configuration("vector_db.top_k must be positive".to_string()));
        }

        if self.embedding.timeout_ms == 0
            || self.vector_db.timeout_ms == 0
            || self.llm.timeout_ms == 0
        {
            return Err(RagError::Configuration("timeouts must be positive".to_string()));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(RagError::Configuration(format!(
                "Unknown logging format: {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

pub(crate) fn parse_flag(val: &str) -> bool {
    let val = val.trim().to_ascii_lowercase();
    val == "true" || val == "1" || val == "yes" || val == "on"
}
