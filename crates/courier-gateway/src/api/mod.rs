//! HTTP API
//!
//! Thin axum layer over [`crate::SessionManager`]: extract, call, map errors.

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod routes;

pub use response::{ApiError, ApiResult};
pub use routes::{create_router, health_routes};
