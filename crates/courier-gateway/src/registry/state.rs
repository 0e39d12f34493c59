//! Session state held by the registry

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use courier_core::{
    Identity, ProtocolClient, ProxyEndpoint, SessionId, SessionStatus, WebhookTarget,
};

use crate::events::EventSubscription;
use crate::pairing::PairingRecord;

/// Registry entry for one live session
///
/// Owns the protocol client handle; nothing outside the registry keeps a
/// long-lived reference to it.
pub struct SessionState {
    id: SessionId,
    pub identity: Option<Identity>,
    pub status: SessionStatus,
    pub last_seen: DateTime<Utc>,
    /// Code of the pairing attempt in flight; reported only until it expires
    pub pairing: Option<PairingRecord>,
    pub proxy: Option<ProxyEndpoint>,
    pub webhook: Option<WebhookTarget>,
    pub(crate) client: Arc<dyn ProtocolClient>,
    pub(crate) subscription: Option<EventSubscription>,
    pub(crate) attempt: Option<CancellationToken>,
}

impl SessionState {
    pub(crate) fn new(
        id: SessionId,
        identity: Option<Identity>,
        client: Arc<dyn ProtocolClient>,
    ) -> Self {
        Self {
            id,
            identity,
            status: SessionStatus::Disconnected,
            last_seen: Utc::now(),
            pairing: None,
            proxy: None,
            webhook: None,
            client,
            subscription: None,
            attempt: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Change status, dropping the pairing code outside `connecting`
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        if !status.allows_pairing_code() {
            self.pairing = None;
        }
        self.touch();
    }

    /// Unexpired pairing code, if any
    pub fn pairing_code(&self) -> Option<&str> {
        self.pairing
            .as_ref()
            .filter(|record| record.is_valid())
            .map(|record| record.code.as_str())
    }

    /// Record activity
    #[inline]
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Whether a connect attempt is still running for this session
    pub fn attempt_in_flight(&self) -> bool {
        self.attempt.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel and forget the in-flight attempt, if any
    pub(crate) fn cancel_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            attempt.cancel();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            identity: self.identity.clone(),
            status: self.status,
            last_seen: self.last_seen,
            pairing_code: self.pairing_code().map(str::to_string),
            proxy: self.proxy.clone(),
            webhook: self.webhook.clone(),
            transport_open: self.client.is_connected(),
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("status", &self.status)
            .field("last_seen", &self.last_seen)
            .field("pairing_code", &self.pairing_code())
            .field("subscribed", &self.subscription.is_some())
            .field("attempt_in_flight", &self.attempt_in_flight())
            .finish()
    }
}

/// Point-in-time copy of a session, safe to hand out of the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub identity: Option<Identity>,
    pub status: SessionStatus,
    pub last_seen: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookTarget>,
    /// Whether the client reports an open transport
    pub transport_open: bool,
}
