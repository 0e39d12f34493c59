//! Session registry
//!
//! The single source of truth for live sessions. Every status change flows
//! through [`SessionRegistry::mutate`].

mod state;
mod store;

pub use state::{SessionSnapshot, SessionState};
pub use store::SessionRegistry;
