//! Connection retry and timeout policy

use std::time::Duration;

use courier_common::SessionSettings;

/// Timing and retry bounds for connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// Bound on a pairing attempt, measured from entering `connecting`
    pub connect_timeout: Duration,
    /// Attempts made by `connect_with_retry`
    pub max_attempts: u32,
    /// Pause between attempts of `connect_with_retry`
    pub retry_delay: Duration,
    /// Pause between disconnect and connect in `reconnect`
    pub reconnect_delay: Duration,
    /// Wait before the first automatic reconnect after a connection loss
    pub auto_reconnect_delay: Duration,
    /// Wait between automatic reconnect rounds
    pub auto_reconnect_interval: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(300),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(1),
            auto_reconnect_delay: Duration::from_secs(5),
            auto_reconnect_interval: Duration::from_secs(30),
        }
    }
}

impl From<&SessionSettings> for ConnectionPolicy {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            max_attempts: settings.connect_max_attempts.max(1),
            retry_delay: Duration::from_millis(settings.connect_retry_delay_ms),
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            auto_reconnect_delay: Duration::from_secs(settings.auto_reconnect_delay_secs),
            auto_reconnect_interval: Duration::from_secs(settings.auto_reconnect_interval_secs),
        }
    }
}
