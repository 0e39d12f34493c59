//! Route definitions
//!
//! Session routes are mounted under /api/v1; health stays at the root.

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::api::handlers::{health, sessions};
use crate::server::GatewayState;

/// API routes (health excluded)
pub fn create_router() -> Router<GatewayState> {
    Router::new().nest("/api/v1", session_routes())
}

pub fn health_routes() -> Router<GatewayState> {
    Router::new().route("/health", get(health::health_check))
}

fn session_routes() -> Router<GatewayState> {
    Router::new()
        .route(
            "/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        // Lifecycle
        .route("/sessions/:id/connect", post(sessions::connect_session))
        .route("/sessions/:id/disconnect", post(sessions::disconnect_session))
        .route("/sessions/:id/reconnect", post(sessions::reconnect_session))
        .route("/sessions/:id/restore", post(sessions::restore_session))
        .route("/sessions/:id/logout", post(sessions::logout_session))
        // State
        .route("/sessions/:id/pairing-code", get(sessions::get_pairing_code))
        .route("/sessions/:id/connection", get(sessions::get_connection_info))
        // Configuration
        .route("/sessions/:id/webhook", put(sessions::set_webhook))
        .route("/sessions/:id/proxy", put(sessions::set_proxy))
}
