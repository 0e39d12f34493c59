//! Session registry store

use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use courier_core::{
    ClientFactory, CredentialStore, DomainError, DomainResult, Identity, ProtocolClient,
    SessionId,
};

use super::state::{SessionSnapshot, SessionState};

/// In-memory map of session id to session state
///
/// All access goes through one `parking_lot::RwLock`; it is never held
/// across an await point.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
    factory: Arc<dyn ClientFactory>,
    credentials: Arc<dyn CredentialStore>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn ClientFactory>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            credentials,
        }
    }

    /// Register a never-authenticated session bound to a fresh credential slot
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn create(&self, id: &SessionId) -> DomainResult<SessionSnapshot> {
        self.ensure_absent(id)?;
        let slot = self.credentials.new_slot().await?;
        let client = self.factory.create(slot);
        self.insert(SessionState::new(id.clone(), None, client))
    }

    /// Register a session bound to the stored credential of `identity`
    ///
    /// A missing credential is a configuration error; the session has to
    /// be paired again from scratch.
    #[instrument(skip(self), fields(session_id = %id, identity = %identity))]
    pub async fn create_with_identity(
        &self,
        id: &SessionId,
        identity: &Identity,
    ) -> DomainResult<SessionSnapshot> {
        self.ensure_absent(id)?;
        let slot = self.credentials.get_slot(identity).await?.ok_or_else(|| {
            DomainError::Configuration(format!("no stored credential for identity {identity}"))
        })?;
        let client = self.factory.create(slot);
        self.insert(SessionState::new(id.clone(), Some(identity.clone()), client))
    }

    pub fn get(&self, id: &SessionId) -> DomainResult<SessionSnapshot> {
        self.read(id, SessionState::snapshot)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Snapshot every session, ordered by id
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .read()
            .values()
            .map(SessionState::snapshot)
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Read a session under the shared lock
    pub fn read<R>(&self, id: &SessionId, f: impl FnOnce(&SessionState) -> R) -> DomainResult<R> {
        self.sessions
            .read()
            .get(id)
            .map(f)
            .ok_or_else(|| DomainError::SessionNotFound(id.clone()))
    }

    /// Update a session under the exclusive lock
    ///
    /// `f` must not block; a `get` issued after `mutate` returns always
    /// observes the change.
    pub fn mutate<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut SessionState) -> R,
    ) -> DomainResult<R> {
        self.sessions
            .write()
            .get_mut(id)
            .map(f)
            .ok_or_else(|| DomainError::SessionNotFound(id.clone()))
    }

    pub(crate) fn client(&self, id: &SessionId) -> DomainResult<Arc<dyn ProtocolClient>> {
        self.read(id, |s| Arc::clone(&s.client))
    }

    /// Tear a session down and delete it
    ///
    /// Cancels any in-flight attempt, unregisters the event subscription and
    /// closes the transport before the entry disappears, so no live client
    /// outlives its registry entry.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn remove(&self, id: &SessionId) -> DomainResult<()> {
        let (client, subscription) = self.mutate(id, |s| {
            s.cancel_attempt();
            (Arc::clone(&s.client), s.subscription.take())
        })?;

        if let Some(subscription) = subscription {
            subscription.close(client.as_ref());
        }

        if client.is_connected() {
            client.disconnect().await;
        } else {
            debug!(session_id = %id, "Client already disconnected");
        }

        // A connect racing with removal may have attached again meanwhile.
        let removed = self.sessions.write().remove(id);
        if let Some(mut state) = removed {
            state.cancel_attempt();
            if let Some(subscription) = state.subscription.take() {
                subscription.close(state.client.as_ref());
            }
        }

        info!(session_id = %id, "Session removed");
        Ok(())
    }

    fn ensure_absent(&self, id: &SessionId) -> DomainResult<()> {
        if self.contains(id) {
            return Err(DomainError::SessionExists(id.clone()));
        }
        Ok(())
    }

    fn insert(&self, state: SessionState) -> DomainResult<SessionSnapshot> {
        match self.sessions.write().entry(state.id().clone()) {
            Entry::Occupied(entry) => Err(DomainError::SessionExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let snapshot = state.snapshot();
                entry.insert(state);
                debug!(session_id = %snapshot.id, "Session registered");
                Ok(snapshot)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryClientFactory, MemoryCredentialStore};
    use courier_core::SessionStatus;

    fn sid(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    fn registry() -> (SessionRegistry, Arc<MemoryClientFactory>, Arc<MemoryCredentialStore>) {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let factory = Arc::new(MemoryClientFactory::new(credentials.clone()));
        let registry = SessionRegistry::new(factory.clone(), credentials.clone());
        (registry, factory, credentials)
    }

    #[tokio::test]
    async fn test_duplicate_create_keeps_one_entry() {
        let (registry, _, _) = registry();
        let id = sid("dup");

        registry.create(&id).await.unwrap();
        let err = registry.create(&id).await.unwrap_err();

        assert!(matches!(err, DomainError::SessionExists(ref e) if *e == id));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (registry, _, _) = registry();
        let err = registry.get(&sid("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_with_identity_requires_credential() {
        let (registry, _, credentials) = registry();
        let identity = Identity::parse("1555@s.whatsapp.net").unwrap();

        let err = registry
            .create_with_identity(&sid("r"), &identity)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));
        assert!(registry.is_empty());

        credentials.store(&identity);
        let snap = registry
            .create_with_identity(&sid("r"), &identity)
            .await
            .unwrap();
        assert_eq!(snap.identity, Some(identity));
        assert_eq!(snap.status, SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_mutate_is_visible_to_get() {
        let (registry, _, _) = registry();
        let id = sid("m");
        registry.create(&id).await.unwrap();

        registry
            .mutate(&id, |s| s.set_status(SessionStatus::Connecting))
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().status, SessionStatus::Connecting);
    }

    #[tokio::test]
    async fn test_remove_disconnects_client() {
        let (registry, factory, _) = registry();
        let id = sid("gone");
        registry.create(&id).await.unwrap();

        let client = factory.last_client().unwrap();
        client.connect_transport();
        assert!(client.is_connected());

        registry.remove(&id).await.unwrap();
        assert!(!client.is_connected());
        assert!(registry.get(&id).unwrap_err().is_not_found());
        assert!(registry.remove(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let (registry, _, _) = registry();
        for raw in ["c", "a", "b"] {
            registry.create(&sid(raw)).await.unwrap();
        }
        let ids: Vec<String> = registry
            .list()
            .into_iter()
            .map(|s| s.id.into_inner())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }
}
