//! Pairing code management
//!
//! Consumes a client's pairing stream, keeps the active code with a fixed
//! TTL, and sweeps expired codes in the background.

mod manager;
mod record;

pub use manager::{PairingConfig, PairingHandle, PairingManager};
pub use record::PairingRecord;
