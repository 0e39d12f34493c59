//! Webhook notifier port
//!
//! The core decides *when* a notification fires; delivery mechanics (HTTP,
//! retries, backoff) belong to the implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DomainResult;
use crate::value_objects::{SessionId, WebhookTarget};

/// A single webhook notification
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDelivery {
    #[serde(skip)]
    pub target: WebhookTarget,
    pub session_id: SessionId,
    pub event: String,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl WebhookDelivery {
    /// Create a delivery stamped with the current time
    pub fn new(
        target: WebhookTarget,
        session_id: SessionId,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            target,
            session_id,
            event: event.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    /// Deliver one notification
    async fn notify(&self, delivery: &WebhookDelivery) -> DomainResult<()>;
}
