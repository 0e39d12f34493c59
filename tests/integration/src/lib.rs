//! Integration test utilities for the session gateway
//!
//! End-to-end tests drive the HTTP API of a real server bound to a local
//! port, with in-memory persistence and protocol clients.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
