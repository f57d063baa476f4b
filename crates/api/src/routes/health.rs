//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub read_model: &'static str,
    pub saga_log_entries: Option<usize>,
}

/// GET /health: reports whether the saga log can be queried.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let read_model = state.read_model.name();
    match state.read_model.count().await {
        Ok(count) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                read_model,
                saga_log_entries: Some(count),
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, read_model, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    read_model,
                    saga_log_entries: None,
                }),
            )
        }
    }
}
