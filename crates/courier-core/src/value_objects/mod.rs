//! Value objects - immutable types that represent domain concepts

mod endpoints;
mod identity;
mod session_id;

pub use endpoints::{ProxyEndpoint, WebhookTarget};
pub use identity::{Identity, IdentityParseError};
pub use session_id::{SessionId, SessionIdError};
