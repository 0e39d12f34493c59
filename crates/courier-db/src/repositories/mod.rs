//! Repository implementations
//!
//! `PgSessionRepository` is the production store; `MemorySessionRepository`
//! backs tests and deployments without a database.

mod error;
mod memory;
mod session;

pub use memory::MemorySessionRepository;
pub use session::PgSessionRepository;
