//! HTTP API

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::*;
pub use models::ApiError;
pub use routes::build_router;

use crate::error::RagError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Error codes returned in `ApiError::code`
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const EMBEDDING_UNAVAILABLE: &str = "EMBEDDING_UNAVAILABLE";
    pub const STORE_UNAVAILABLE: &str = "STORE_UNAVAILABLE";
    pub const GENERATION_UNAVAILABLE: &str = "GENERATION_UNAVAILABLE";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Map a terminal pipeline error to status and body
pub fn error_response(err: &RagError) -> (StatusCode, Json<ApiError>) {
    (err.status_code(), Json(ApiError::new(err.code(), err.to_string())))
}

impl IntoResponse for RagError {
    fn into_response(self) -> Response {
        error_response(&self).into_response()
    }
}
