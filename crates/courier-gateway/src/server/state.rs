//! Gateway server state

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use courier_common::AppConfig;

use crate::session::SessionManager;

/// State shared across all handlers
#[derive(Clone)]
pub struct GatewayState {
    sessions: Arc<SessionManager>,
    config: Arc<AppConfig>,
    /// Cancelled when the server starts shutting down
    shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(sessions: Arc<SessionManager>, config: AppConfig) -> Self {
        Self {
            sessions,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Token for one request's long-running work; cancelled on shutdown
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("sessions", &"SessionManager")
            .field("config", &"AppConfig")
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish()
    }
}
