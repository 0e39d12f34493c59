//! # courier-db
//!
//! Persistence layer implementing `SessionRepository` from `courier-core`.
//!
//! ## Overview
//!
//! - Connection pool management (PostgreSQL via SQLx)
//! - Database model with SQLx `FromRow` derive
//! - Record <-> model mapper
//! - `PgSessionRepository` and the dashmap-backed `MemorySessionRepository`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use courier_db::{create_pool, DatabaseConfig, PgSessionRepository};
//! use courier_core::traits::SessionRepository;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig {
//!         url: std::env::var("DATABASE_URL")?,
//!         ..DatabaseConfig::default()
//!     };
//!     let pool = create_pool(&config).await?;
//!     let sessions = PgSessionRepository::new(pool);
//!
//!     let restorable = sessions.find_with_identity().await?;
//!     Ok(())
//! }
//! ```

pub mod mappers;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used types
pub use pool::{create_pool, DatabaseConfig, PgPool};
pub use repositories::{MemorySessionRepository, PgSessionRepository};
