//! Health check handler

use axum::{extract::State, Json};

use crate::api::dto::HealthResponse;
use crate::server::GatewayState;

/// Liveness probe
///
/// GET /health
pub async fn health_check(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions().list_sessions().len(),
    })
}
