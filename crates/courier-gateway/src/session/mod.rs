//! Session manager facade
//!
//! Composes the registry, pairing manager, connection manager and event
//! dispatcher into the operations consumed by the HTTP API and startup code.

mod builder;
mod manager;

pub use builder::SessionManagerBuilder;
pub use manager::{RestoreReport, SessionManager};
