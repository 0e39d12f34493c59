//! Database models - SQLx-compatible structs for PostgreSQL tables

mod session;

pub use session::SessionModel;
