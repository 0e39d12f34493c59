//! Session entity - the persisted view of a tenant session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{Identity, ProxyEndpoint, SessionId, WebhookTarget};

/// Connection status of a session
///
/// ```text
/// disconnected -> connecting -> connected -> reconnecting -> connecting | connected
///        any -> error -> disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl SessionStatus {
    /// Get the string representation stored in the database
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    /// Parse a status from its stored representation
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "disconnected" => Some(Self::Disconnected),
            "connecting" => Some(Self::Connecting),
            "connected" => Some(Self::Connected),
            "reconnecting" => Some(Self::Reconnecting),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether a pairing code may be held in this status
    #[inline]
    #[must_use]
    pub const fn allows_pairing_code(self) -> bool {
        matches!(self, Self::Connecting)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted session row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub identity: Option<Identity>,
    pub status: SessionStatus,
    pub proxy: Option<ProxyEndpoint>,
    pub webhook: Option<WebhookTarget>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create a new, never-authenticated session record
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            identity: None,
            status: SessionStatus::Disconnected,
            proxy: None,
            webhook: None,
            last_seen: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a known identity (restored sessions)
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Whether the session has ever completed authentication
    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}
