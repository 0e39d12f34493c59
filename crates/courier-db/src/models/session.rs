//! Session database model

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database model for the `sessions` table
///
/// ```sql
/// CREATE TABLE sessions (
///     id             VARCHAR(64) PRIMARY KEY,
///     identity       TEXT,
///     status         VARCHAR(16) NOT NULL DEFAULT 'disconnected',
///     proxy_url      TEXT,
///     proxy_insecure BOOLEAN NOT NULL DEFAULT FALSE,
///     webhook_url    TEXT,
///     last_seen      TIMESTAMPTZ,
///     created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
#[derive(Debug, Clone, FromRow)]
pub struct SessionModel {
    pub id: String,
    pub identity: Option<String>,
    pub status: String,
    pub proxy_url: Option<String>,
    pub proxy_insecure: bool,
    pub webhook_url: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionModel {
    /// Check if the session has ever authenticated
    #[inline]
    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }
}
