//! Connection telemetry
//!
//! Kept apart from the registry: entries outlive session removal so the
//! last known state of a removed session can still be inspected.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

use courier_core::{SessionId, SessionStatus};

/// Connection history of one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub status: SessionStatus,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Reconnects requested explicitly or by the auto-reconnect loop
    pub retry_count: u32,
    /// Every connect attempt, successful or not
    pub attempt_count: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct ConnectionTracker {
    entries: RwLock<HashMap<SessionId, ConnectionInfo>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, id: &SessionId, f: impl FnOnce(&mut ConnectionInfo)) {
        f(self.entries.write().entry(id.clone()).or_default());
    }

    pub fn record_attempt(&self, id: &SessionId) {
        self.update(id, |info| {
            info.status = SessionStatus::Connecting;
            info.last_attempt_at = Some(Utc::now());
            info.attempt_count += 1;
        });
    }

    pub fn record_connected(&self, id: &SessionId) {
        self.update(id, |info| {
            info.status = SessionStatus::Connected;
            info.connected_at = Some(Utc::now());
            info.last_error = None;
        });
    }

    pub fn record_disconnected(&self, id: &SessionId, reason: Option<String>) {
        self.update(id, |info| {
            info.status = SessionStatus::Disconnected;
            info.disconnected_at = Some(Utc::now());
            if reason.is_some() {
                info.last_error = reason;
            }
        });
    }

    pub fn record_failure(&self, id: &SessionId, error: &impl ToString) {
        self.update(id, |info| {
            info.status = SessionStatus::Error;
            info.last_error = Some(error.to_string());
        });
    }

    pub fn record_retry(&self, id: &SessionId) {
        self.update(id, |info| {
            info.status = SessionStatus::Reconnecting;
            info.retry_count += 1;
        });
    }

    pub fn get(&self, id: &SessionId) -> Option<ConnectionInfo> {
        self.entries.read().get(id).cloned()
    }

    /// Every tracked session, ordered by id
    pub fn all(&self) -> Vec<(SessionId, ConnectionInfo)> {
        let mut all: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
