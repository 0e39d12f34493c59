//! # courier-core
//!
//! Domain layer containing session entities, value objects, protocol events,
//! and the ports (traits) implemented by the protocol client, datastore and
//! webhook collaborators.
//! This crate has zero dependencies on infrastructure (database, web framework, etc.).

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{SessionRecord, SessionStatus};
pub use error::{DomainError, DomainResult};
pub use events::{
    MessageSummary, PairingEvent, PresenceSummary, ProtocolEvent, ReceiptSummary,
};
pub use traits::{
    ClientError, ClientFactory, CredentialSlot, CredentialStore, EventHandler, HandlerId,
    PairingStream, ProtocolClient, RepoResult, SessionRepository, WebhookDelivery,
    WebhookNotifier,
};
pub use value_objects::{
    Identity, IdentityParseError, ProxyEndpoint, SessionId, SessionIdError, WebhookTarget,
};
