//! API handlers

use super::error_codes;
use super::error_response;
use super::models::*;
use crate::llm::Reachability;
use crate::metrics::METRICS;
use crate::pipeline::{Answer, QueryOrchestrator};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Shared application state; only obtainable from [`crate::bootstrap`]
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<QueryOrchestrator>,
    pub collection: String,
}

/// Answer a question
///
/// POST /query/
pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Answer>, (StatusCode, Json<ApiError>)> {
    let start = Instant::now();

    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected query body: {}", rejection.body_text());
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError::new(error_codes::VALIDATION_ERROR, rejection.body_text())),
        )
    })?;

    info!("Query request: {} chars", request.question.chars().count());

    match state.orchestrator.answer(&request.question).await {
        Ok(outcome) => {
            info!(
                "Query completed in {:?}: source={}",
                start.elapsed(),
                outcome.answer.source.as_str()
            );
            Ok(Json(outcome.answer))
        }
        Err(e) => {
            if e.status_code().is_server_error() {
                error!("Query failed: {}", e);
            } else {
                warn!("Query rejected: {}", e);
            }
            Err(error_response(&e))
        }
    }
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".to_string(),
        collection: state.collection.clone(),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let orchestrator = &state.orchestrator;
    let store = orchestrator.store();
    let client = orchestrator.client();
    let vector_store_available = store.is_available().await;

    Json(HealthResponse {
        status: if vector_store_available { "ok" } else { "degraded" }.to_string(),
        llm_configured: client.map(|c| c.is_configured()).unwrap_or(false),
        llm_model: client.map(|c| c.model().to_string()),
        vector_store_available,
        facts_indexed: store.len(),
    })
}

/// GET /diagnostics
pub async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let orchestrator = &state.orchestrator;
    let store = orchestrator.store();
    let client = orchestrator.client();

    let probe = async {
        match client {
            Some(client) => client.probe().await,
            None => Reachability::default(),
        }
    };
    let (vector_store_available, reachability) = futures::join!(store.is_available(), probe);

    let report = DiagnosticsResponse {
        llm_provider: client
            .map(|c| c.provider().to_string())
            .unwrap_or_else(|| "none".to_string()),
        llm_configured: client.map(|c| c.is_configured()).unwrap_or(false),
        llm_model: client.map(|c| c.model().to_string()),
        llm_url: client.and_then(|c| c.endpoint()),
        llm_url_reachable: None,
        llm_url_error: None,
        vector_store_backend: store.backend_name().to_string(),
        vector_store_available,
        embedder_model: store.embedder().model_name().to_string(),
        embedding_dims: store.dims(),
        facts_indexed: store.len(),
        min_similarity: orchestrator.gate().min_similarity(),
        fallback_to_llm_for_restricted_domain: orchestrator.policy().allow_generation(),
    };

    Json(report.with_reachability(reachability))
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}
