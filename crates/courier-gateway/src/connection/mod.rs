//! Connection management
//!
//! Drives the per-session connection state machine:
//!
//! ```text
//! disconnected -> connecting -> connected -> reconnecting -> connecting | connected
//!          any -> error -> disconnected
//! ```

mod manager;
mod policy;
mod tracker;

pub use manager::{ConnectOutcome, ConnectionManager};
pub use policy::ConnectionPolicy;
pub use tracker::{ConnectionInfo, ConnectionTracker};
