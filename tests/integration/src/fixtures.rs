//! Test fixtures and response shapes

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};

use courier_core::Identity;

/// Code every in-memory client issues
pub const PAIRING_CODE: &str = "INTEG123";

/// Default webhook target; deliveries land in the recording notifier
pub const WEBHOOK_URL: &str = "http://hooks.test/courier";

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A fresh, unique session id
pub fn unique_session() -> String {
    format!("session-{}", unique_suffix())
}

/// A fresh, unique device identity
pub fn unique_identity() -> Identity {
    Identity::parse(format!("1555{:07}:1@s.whatsapp.net", unique_suffix()))
        .expect("valid identity")
}

/// GET /api/v1/sessions/:id
#[derive(Debug, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub identity: Option<String>,
    pub status: String,
    pub pairing_code: Option<String>,
    pub proxy: Option<ProxyResponse>,
    pub webhook: Option<String>,
    pub transport_open: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProxyResponse {
    pub url: String,
    pub insecure: bool,
}

/// POST /api/v1/sessions/:id/connect
#[derive(Debug, Deserialize)]
pub struct ConnectResponse {
    pub session_id: String,
    pub outcome: String,
    pub code: Option<String>,
}

/// GET /api/v1/sessions/:id/pairing-code
#[derive(Debug, Deserialize)]
pub struct PairingCodeResponse {
    pub session_id: String,
    pub status: String,
    pub code: Option<String>,
}

/// GET /api/v1/sessions/:id/connection
#[derive(Debug, Deserialize)]
pub struct ConnectionResponse {
    pub session_id: String,
    pub status: String,
    pub retry_count: u32,
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

/// GET /health
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions: usize,
}
