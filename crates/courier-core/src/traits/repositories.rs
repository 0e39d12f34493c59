//! Repository traits (ports) - define the interface for session persistence
//!
//! The domain layer defines what it needs, and the infrastructure layer
//! provides the implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{SessionRecord, SessionStatus};
use crate::error::DomainError;
use crate::value_objects::{Identity, ProxyEndpoint, SessionId, WebhookTarget};

/// Result type for repository operations
pub type RepoResult<T> = Result<T, DomainError>;

// ============================================================================
// Session Repository
// ============================================================================

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session; fails with `SessionExists` on duplicates
    async fn create(&self, record: &SessionRecord) -> RepoResult<()>;

    /// Find a session by ID
    async fn find_by_id(&self, id: &SessionId) -> RepoResult<Option<SessionRecord>>;

    /// List every persisted session
    async fn find_all(&self) -> RepoResult<Vec<SessionRecord>>;

    /// List sessions that completed authentication at least once
    async fn find_with_identity(&self) -> RepoResult<Vec<SessionRecord>>;

    /// Update the connection status
    async fn update_status(&self, id: &SessionId, status: SessionStatus) -> RepoResult<()>;

    /// Set or clear the protocol identity
    async fn update_identity(&self, id: &SessionId, identity: Option<&Identity>)
        -> RepoResult<()>;

    /// Record inbound activity
    async fn update_last_seen(&self, id: &SessionId, at: DateTime<Utc>) -> RepoResult<()>;

    /// Set or clear the egress proxy
    async fn update_proxy(&self, id: &SessionId, proxy: Option<&ProxyEndpoint>)
        -> RepoResult<()>;

    /// Set or clear the webhook target
    async fn update_webhook(
        &self,
        id: &SessionId,
        webhook: Option<&WebhookTarget>,
    ) -> RepoResult<()>;

    /// Delete a session
    async fn delete(&self, id: &SessionId) -> RepoResult<()>;
}
