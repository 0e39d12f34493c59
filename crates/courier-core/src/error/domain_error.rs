//! Domain errors - error types for the session lifecycle
//!
//! The variants split into three families the calling layer cares about:
//! state-machine violations (returned synchronously, never retried),
//! transient failures (retried by the connection manager), and failures that
//! require operator action (reconfigure or re-pair).

use thiserror::Error;

use crate::value_objects::SessionId;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session already exists: {0}")]
    SessionExists(SessionId),

    // =========================================================================
    // State Machine Errors
    // =========================================================================
    #[error("Session is already connected")]
    AlreadyConnected,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session has no known identity; pairing is required")]
    AuthenticationRequired,

    // =========================================================================
    // Pairing Errors
    // =========================================================================
    #[error("Pairing timed out")]
    PairingTimeout,

    #[error("Pairing failed: {0}")]
    PairingError(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    #[error("Connection failed: {0}")]
    ConnectFailure(String),

    #[error("Connection failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DomainError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Webhook error: {0}")]
    WebhookError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Get an error code string for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "UNKNOWN_SESSION",
            Self::SessionExists(_) => "SESSION_EXISTS",
            Self::AlreadyConnected => "ALREADY_CONNECTED",
            Self::NotConnected => "NOT_CONNECTED",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::PairingTimeout => "PAIRING_TIMEOUT",
            Self::PairingError(_) => "PAIRING_ERROR",
            Self::ConnectFailure(_) => "CONNECT_FAILURE",
            Self::RetriesExhausted { .. } => "CONNECT_RETRIES_EXHAUSTED",
            Self::Cancelled => "CANCELLED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::WebhookError(_) => "WEBHOOK_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_))
    }

    /// Check if this is a conflict (invalid state transition) error
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::SessionExists(_) | Self::AlreadyConnected | Self::NotConnected
        )
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_))
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailure(_) | Self::RetriesExhausted { .. })
    }

    /// Whether the caller must start a fresh pairing cycle or fix configuration
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired
                | Self::PairingTimeout
                | Self::PairingError(_)
                | Self::Configuration(_)
        )
    }

    /// The innermost error for wrapped retry failures
    pub fn root(&self) -> &DomainError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}
