//! Protocol event types
//!
//! `ProtocolEvent` is the tagged union of everything a protocol client may
//! push through its event callback. The set is open-ended on the client side,
//! so unknown kinds are carried as `Other` instead of being dropped at the
//! boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Identity;

/// Events delivered by the protocol client's event callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    // =========================================================================
    // Connection Events
    // =========================================================================
    /// Transport is up and the session is authenticated
    Connected,
    /// Transport dropped without being asked to
    Disconnected,
    /// The remote side revoked this device
    LoggedOut { reason: Option<String> },

    // =========================================================================
    // Pairing Events
    // =========================================================================
    /// Pairing completed; the client is now bound to `identity`
    PairSuccess {
        identity: Identity,
        platform: Option<String>,
    },
    /// Pairing failed after the code was scanned
    PairError {
        identity: Option<Identity>,
        error: String,
    },

    // =========================================================================
    // Activity Events
    // =========================================================================
    Message(MessageSummary),
    Receipt(ReceiptSummary),
    Presence(PresenceSummary),

    /// Anything the gateway does not handle
    Other { kind: String },
}

impl ProtocolEvent {
    /// Event name used in logs and webhook notifications
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::LoggedOut { .. } => "logged_out",
            Self::PairSuccess { .. } => "pair_success",
            Self::PairError { .. } => "pair_error",
            Self::Message(_) => "message",
            Self::Receipt(_) => "receipt",
            Self::Presence(_) => "presence",
            Self::Other { kind } => kind,
        }
    }

    /// Whether this event only reflects inbound activity (no state change)
    #[must_use]
    pub fn is_activity(&self) -> bool {
        matches!(self, Self::Message(_) | Self::Receipt(_) | Self::Presence(_))
    }
}

/// Structured summary of an inbound message
///
/// Message content is deliberately absent; history persistence belongs to a
/// separate collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub chat: String,
    pub sender: String,
    pub from_me: bool,
    /// Payload kind, e.g. `text`, `image`, `location`
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

/// Delivery / read receipt summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub message_ids: Vec<String>,
    pub chat: String,
    pub sender: String,
    /// Receipt kind, e.g. `delivered`, `read`
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

/// Contact presence update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSummary {
    pub from: String,
    pub available: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Events on a client's pairing stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PairingEvent {
    /// A new pairing code is active
    Code { code: String },
    /// Authentication completed
    Success,
    /// The client stopped issuing codes
    Timeout,
    /// Pairing failed
    Error { message: String },
}

impl PairingEvent {
    /// Whether the event ends the pairing stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Code { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        assert_eq!(ProtocolEvent::Connected.kind(), "connected");
        assert_eq!(
            ProtocolEvent::LoggedOut { reason: None }.kind(),
            "logged_out"
        );
        assert_eq!(
            ProtocolEvent::Other {
                kind: "history_sync".to_string()
            }
            .kind(),
            "history_sync"
        );
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ProtocolEvent::PairSuccess {
            identity: Identity::parse("1@s.whatsapp.net").unwrap(),
            platform: Some("android".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pair_success");
        assert_eq!(json["identity"], "1@s.whatsapp.net");
    }

    #[test]
    fn test_activity_events() {
        let presence = ProtocolEvent::Presence(PresenceSummary {
            from: "2@s.whatsapp.net".to_string(),
            available: true,
            last_seen: None,
        });
        assert!(presence.is_activity());
        assert!(!ProtocolEvent::Connected.is_activity());
    }

    #[test]
    fn test_pairing_terminal() {
        assert!(!PairingEvent::Code {
            code: "ABC".to_string()
        }
        .is_terminal());
        assert!(PairingEvent::Success.is_terminal());
        assert!(PairingEvent::Timeout.is_terminal());
    }
}
