//! Pairing code record

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// An issued pairing code
///
/// Expiry uses the monotonic clock; `issued_at` is only informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub created_at: Instant,
    pub expires_at: Instant,
    /// Pairing attempt that issued the code
    pub(crate) attempt: u64,
}

impl PairingRecord {
    pub(crate) fn new(code: String, ttl: Duration, attempt: u64) -> Self {
        let created_at = Instant::now();
        Self {
            code,
            issued_at: Utc::now(),
            created_at,
            expires_at: created_at + ttl,
            attempt,
        }
    }

    /// Valid up to and including `expires_at`
    #[inline]
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now <= self.expires_at
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    /// Time left before expiry (zero once expired)
    pub fn expires_in(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}
