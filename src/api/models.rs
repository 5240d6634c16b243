//! Request and response bodies

use crate::llm::Reachability;
use serde::{Deserialize, Serialize};

/// API error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// `POST /query/` body; a missing `question` is treated as empty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub status: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub llm_configured: bool,
    pub llm_model: Option<String>,
    pub vector_store_available: bool,
    pub facts_indexed: usize,
}

/// Configuration and reachability report; never contains secret values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    pub llm_provider: String,
    pub llm_configured: bool,
    pub llm_model: Option<String>,
    /// Endpoint without query string
    pub llm_url: Option<String>,
    pub llm_url_reachable: Option<bool>,
    pub llm_url_error: Option<String>,
    pub vector_store_backend: String,
    pub vector_store_available: bool,
    pub embedder_model: String,
    pub embedding_dims: usize,
    pub facts_indexed: usize,
    pub min_similarity: f32,
    pub fallback_to_llm_for_restricted_domain: bool,
}

impl DiagnosticsResponse {
    pub(crate) fn with_reachability(mut self, probe: Reachability) -> Self {
        self.llm_url_reachable = probe.reachable;
        self.llm_url_error = probe.error;
        self
    }
}
