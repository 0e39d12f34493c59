//! Ports - interfaces the session core consumes from its collaborators

mod protocol;
mod repositories;
mod webhook;

pub use protocol::{
    ClientError, ClientFactory, CredentialSlot, CredentialStore, EventHandler, HandlerId,
    PairingStream, ProtocolClient,
};
pub use repositories::{RepoResult, SessionRepository};
pub use webhook::{WebhookDelivery, WebhookNotifier};
