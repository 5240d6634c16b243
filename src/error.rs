//! Error types for the query pipeline

use axum::http::StatusCode;
use thiserror::Error;

use crate::embedding::EmbedError;
use crate::facts::StoreError;
use crate::llm::GenerationError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, RagError>;

/// Pipeline error taxonomy
#[derive(Error, Debug)]
pub enum RagError {
    /// Empty or invalid question, rejected before any external call
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Dimension mismatch, unknown backend, missing credential
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RagError {
    /// Machine-readable error code returned in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Validation(_) => crate::api::error_codes::VALIDATION_ERROR,
            RagError::EmbeddingUnavailable(_) => crate::api::error_codes::EMBEDDING_UNAVAILABLE,
            RagError::StoreUnavailable(_) => crate::api::error_codes::STORE_UNAVAILABLE,
            RagError::GenerationUnavailable(_) => crate::api::error_codes::GENERATION_UNAVAILABLE,
            RagError::Configuration(_) => crate::api::error_codes::CONFIGURATION_ERROR,
            RagError::Internal(_) => crate::api::error_codes::INTERNAL_ERROR,
        }
    }

    /// HTTP status for a terminal error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::EmbeddingUnavailable(_)
            | RagError::StoreUnavailable(_)
            | RagError::GenerationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Configuration(_) | RagError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the orchestrator may degrade instead of failing the request
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable(_)
                | RagError::StoreUnavailable(_)
                | RagError::GenerationUnavailable(_)
        )
    }
}

impl From<EmbedError> for RagError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::DimensionMismatch { .. } => RagError::Configuration(e.to_string()),
            other => RagError::EmbeddingUnavailable(other.to_string()),
        }
    }
}

impl From<StoreError> for RagError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DimensionMismatch { .. } => RagError::Configuration(e.to_string()),
            other => RagError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<GenerationError> for RagError {
    fn from(e: GenerationError) -> Self {
        RagError::GenerationUnavailable(e.to_string())
    }
}

impl From<config::ConfigError> for RagError {
    fn from(e: config::ConfigError) -> Self {
        RagError::Configuration(e.to_string())
    }
}
