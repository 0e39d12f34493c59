//! Protocol client ports
//!
//! The protocol client owns wire transport, encryption and device pairing.
//! The session core only drives it through this narrow interface.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

use crate::error::DomainError;
use crate::events::{PairingEvent, ProtocolEvent};
use crate::traits::RepoResult;
use crate::value_objects::{Identity, ProxyEndpoint};

/// Stream of pairing events produced by a client
pub type PairingStream = BoxStream<'static, PairingEvent>;

/// Callback invoked by the client for every protocol event
///
/// Implementations must return quickly; the gateway only enqueues the event.
pub type EventHandler = Arc<dyn Fn(ProtocolEvent) + Send + Sync>;

/// Handle returned by `register_event_handler`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a device credential held by the credential store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialSlot {
    key: String,
}

impl CredentialSlot {
    /// Create a slot reference from a store-specific key
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Store-specific key
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Errors reported by a protocol client
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("client is already connected")]
    AlreadyConnected,

    #[error("client is not logged in")]
    NotLoggedIn,

    #[error("client is already logged in")]
    AlreadyLoggedIn,

    #[error("pairing error: {0}")]
    Pairing(String),

    #[error("invalid proxy: {0}")]
    Proxy(String),
}

impl From<ClientError> for DomainError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Transport(msg) => DomainError::ConnectFailure(msg),
            ClientError::AlreadyConnected => DomainError::AlreadyConnected,
            ClientError::NotLoggedIn => DomainError::AuthenticationRequired,
            ClientError::AlreadyLoggedIn => DomainError::Configuration(
                "client already holds a credential; pairing is not possible".to_string(),
            ),
            ClientError::Pairing(msg) => DomainError::PairingError(msg),
            ClientError::Proxy(msg) => DomainError::ValidationError(msg),
        }
    }
}

// ============================================================================
// Protocol Client
// ============================================================================

#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Open the transport (and log in when a credential is bound)
    async fn connect(&self) -> Result<(), ClientError>;

    /// Close the transport; a no-op when already closed
    async fn disconnect(&self);

    /// Deauthenticate the bound credential on the remote side
    async fn logout(&self) -> Result<(), ClientError>;

    /// Whether the transport is currently open
    fn is_connected(&self) -> bool;

    /// Request the pairing event stream; must be called before `connect`
    async fn pairing_events(&self) -> Result<PairingStream, ClientError>;

    /// Register the event callback
    fn register_event_handler(&self, handler: EventHandler) -> HandlerId;

    /// Unregister an event callback; returns false if it was not registered
    fn remove_event_handler(&self, id: HandlerId) -> bool;

    /// Identity of the locally stored credential, if any
    fn known_identity(&self) -> Option<Identity>;

    /// Route the transport through an egress proxy (None to clear)
    fn set_proxy(&self, proxy: Option<&ProxyEndpoint>) -> Result<(), ClientError>;
}

/// Builds protocol clients bound to a credential slot
pub trait ClientFactory: Send + Sync {
    fn create(&self, slot: CredentialSlot) -> Arc<dyn ProtocolClient>;
}

// ============================================================================
// Credential Store
// ============================================================================

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Allocate an empty slot for a new device registration
    async fn new_slot(&self) -> RepoResult<CredentialSlot>;

    /// Find the slot holding the credential for `identity`
    async fn get_slot(&self, identity: &Identity) -> RepoResult<Option<CredentialSlot>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_mapping() {
        let err: DomainError = ClientError::Transport("reset by peer".to_string()).into();
        assert!(matches!(err, DomainError::ConnectFailure(_)));
        assert!(err.is_retryable());

        let err: DomainError = ClientError::NotLoggedIn.into();
        assert!(matches!(err, DomainError::AuthenticationRequired));

        let err: DomainError = ClientError::AlreadyLoggedIn.into();
        assert!(matches!(err, DomainError::Configuration(_)));
    }

    #[test]
    fn test_credential_slot_key() {
        let slot = CredentialSlot::new("device-7");
        assert_eq!(slot.key(), "device-7");
    }
}
