//! In-memory SessionRepository
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use courier_core::entities::{SessionRecord, SessionStatus};
use courier_core::error::DomainError;
use courier_core::traits::{RepoResult, SessionRepository};
use courier_core::value_objects::{Identity, ProxyEndpoint, SessionId, WebhookTarget};

use super::error::session_not_found;

/// DashMap-backed session store
#[derive(Debug, Default)]
pub struct MemorySessionRepository {
    sessions: DashMap<SessionId, SessionRecord>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot a stored record (test inspection)
    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    fn modify<F>(&self, id: &SessionId, f: F) -> RepoResult<()>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut record = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| session_not_found(id))?;
        f(&mut record);
        record.updated_at = Utc::now();
        Ok(())
    }

    fn collect<P>(&self, predicate: P) -> Vec<SessionRecord>
    where
        P: Fn(&SessionRecord) -> bool,
    {
        let mut records: Vec<SessionRecord> = self
            .sessions
            .iter()
            .filter(|r| predicate(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, record: &SessionRecord) -> RepoResult<()> {
        match self.sessions.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(DomainError::SessionExists(record.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, id: &SessionId) -> RepoResult<Option<SessionRecord>> {
        Ok(self.get(id))
    }

    async fn find_all(&self) -> RepoResult<Vec<SessionRecord>> {
        Ok(self.collect(|_| true))
    }

    async fn find_with_identity(&self) -> RepoResult<Vec<SessionRecord>> {
        Ok(self.collect(SessionRecord::is_authenticated))
    }

    async fn update_status(&self, id: &SessionId, status: SessionStatus) -> RepoResult<()> {
        self.modify(id, |r| r.status = status)
    }

    async fn update_identity(
        &self,
        id: &SessionId,
        identity: Option<&Identity>,
    ) -> RepoResult<()> {
        self.modify(id, |r| r.identity = identity.cloned())
    }

    async fn update_last_seen(&self, id: &SessionId, at: DateTime<Utc>) -> RepoResult<()> {
        self.modify(id, |r| r.last_seen = Some(at))
    }

    async fn update_proxy(
        &self,
        id: &SessionId,
        proxy: Option<&ProxyEndpoint>,
    ) -> RepoResult<()> {
        self.modify(id, |r| r.proxy = proxy.cloned())
    }

    async fn update_webhook(
        &self,
        id: &SessionId,
        webhook: Option<&WebhookTarget>,
    ) -> RepoResult<()> {
        self.modify(id, |r| r.webhook = webhook.cloned())
    }

    async fn delete(&self, id: &SessionId) -> RepoResult<()> {
        self.sessions.remove(id);
        Ok(())
    }
}
