//! Protocol client backends
//!
//! The gateway only talks to protocol clients through the
//! `courier_core::ProtocolClient` port. This module ships the in-memory
//! backend used by the test suites and by the binary when no real protocol
//! backend is wired in.

mod memory;

pub use memory::{MemoryClient, MemoryClientFactory, MemoryCredentialStore};
