//! # courier-gateway
//!
//! Multi-tenant session gateway: keeps many protocol sessions alive,
//! pairs new devices, reconnects lost ones, and turns protocol events into
//! persisted state and webhook notifications.
//!
//! ## Components
//!
//! - [`registry`]: authoritative in-memory session map
//! - [`pairing`]: time-boxed pairing codes and their cleanup sweep
//! - [`connection`]: connection state machine, retries, auto-reconnect
//! - [`events`]: per-session event pump and event fan-out
//! - [`session`]: the [`SessionManager`] facade used by the HTTP API
//! - [`webhook`]: HTTP webhook delivery
//! - [`client`]: in-memory protocol client used without a real backend
//! - [`api`] / [`server`]: axum HTTP surface and server bootstrap

pub mod api;
pub mod client;
pub mod connection;
pub mod events;
pub mod pairing;
pub mod registry;
pub mod server;
pub mod session;
pub mod webhook;

pub use connection::{ConnectOutcome, ConnectionInfo, ConnectionPolicy};
pub use registry::{SessionRegistry, SessionSnapshot};
pub use server::run;
pub use session::{SessionManager, SessionManagerBuilder};
