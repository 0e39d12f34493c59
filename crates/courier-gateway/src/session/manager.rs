//! Session manager

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use courier_core::{
    DomainError, DomainResult, Identity, ProxyEndpoint, SessionId, SessionRecord,
    SessionRepository, SessionStatus, WebhookTarget,
};

use crate::connection::{ConnectOutcome, ConnectionInfo, ConnectionManager};
use crate::pairing::PairingManager;
use crate::registry::{SessionRegistry, SessionSnapshot};

/// Sessions restored concurrently by [`SessionManager::restore_all`]
const RESTORE_CONCURRENCY: usize = 8;

/// Outcome of [`SessionManager::restore_all`]
#[derive(Debug, Default, Serialize)]
pub struct RestoreReport {
    pub restored: Vec<SessionId>,
    pub failed: Vec<(SessionId, String)>,
}

/// Entry point for every session lifecycle operation
pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    pairing: Arc<PairingManager>,
    connections: Arc<ConnectionManager>,
    repository: Arc<dyn SessionRepository>,
    background: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    pub(super) fn new(
        registry: Arc<SessionRegistry>,
        pairing: Arc<PairingManager>,
        connections: Arc<ConnectionManager>,
        repository: Arc<dyn SessionRepository>,
        background: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            registry,
            pairing,
            connections,
            repository,
            background,
            tasks: Mutex::new(tasks),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register and persist a new, unpaired session
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn create_session(&self, id: &SessionId) -> DomainResult<SessionSnapshot> {
        let snapshot = self.registry.create(id).await?;

        if let Err(e) = self.repository.create(&SessionRecord::new(id.clone())).await {
            self.rollback(id).await;
            return Err(e);
        }

        info!(session_id = %id, "Session created");
        Ok(snapshot)
    }

    /// Connect a session, retrying transport failures
    pub async fn connect_session(
        &self,
        cancel: &CancellationToken,
        id: &SessionId,
    ) -> DomainResult<ConnectOutcome> {
        self.connections.connect_with_retry(id, cancel).await
    }

    pub async fn disconnect_session(&self, id: &SessionId) -> DomainResult<()> {
        self.connections.disconnect(id).await
    }

    pub async fn reconnect_session(
        &self,
        cancel: &CancellationToken,
        id: &SessionId,
    ) -> DomainResult<ConnectOutcome> {
        self.connections.reconnect(id, cancel).await
    }

    /// Tear a session down and delete it, even mid-connect
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn remove_session(&self, id: &SessionId) -> DomainResult<()> {
        self.connections.cancel_reconnect(id);
        self.registry.remove(id).await?;
        self.pairing.forget(id);

        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        let deleted = self
            .connections
            .persist("delete_session", id, async move {
                repository.delete(&session_id).await
            })
            .await;
        self.connections.release(id);
        deleted?;

        info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Deauthenticate a session; the next connect pairs a new device
    pub async fn logout_session(&self, id: &SessionId) -> DomainResult<()> {
        self.connections.logout(id).await
    }

    // ========================================================================
    // Restore
    // ========================================================================

    /// Bring a previously paired session back and connect it
    ///
    /// The datastore is written only once the registry accepted the session,
    /// so a live duplicate or a missing credential leaves the stored record
    /// untouched.
    #[instrument(skip(self, cancel), fields(session_id = %id, identity = %identity))]
    pub async fn restore_session(
        &self,
        cancel: &CancellationToken,
        id: &SessionId,
        identity: &Identity,
    ) -> DomainResult<ConnectOutcome> {
        let stored = self.repository.find_by_id(id).await?;
        let record = match &stored {
            Some(record) => SessionRecord {
                identity: Some(identity.clone()),
                ..record.clone()
            },
            None => SessionRecord::new(id.clone()).with_identity(identity.clone()),
        };

        self.register(&record).await?;

        let persisted = match &stored {
            Some(previous) if previous.identity.as_ref() == Some(identity) => Ok(()),
            Some(_) => self.repository.update_identity(id, Some(identity)).await,
            None => self.repository.create(&record).await,
        };
        if let Err(e) = persisted {
            self.rollback(id).await;
            return Err(e);
        }

        self.connections.connect_with_retry(id, cancel).await
    }

    /// Restore every persisted session that has an identity
    ///
    /// Sessions already in the registry are skipped; per-session failures are
    /// logged and reported, never fatal.
    pub async fn restore_all(&self, cancel: &CancellationToken) -> DomainResult<RestoreReport> {
        let records: Vec<SessionRecord> = self
            .repository
            .find_with_identity()
            .await?
            .into_iter()
            .filter(|r| !self.registry.contains(&r.id))
            .collect();

        info!(count = records.len(), "Restoring persisted sessions");

        let results: Vec<(SessionId, DomainResult<ConnectOutcome>)> = stream::iter(records)
            .map(|record| async move {
                let id = record.id.clone();
                let result = match self.register(&record).await {
                    Ok(()) => self.connections.connect_with_retry(&id, cancel).await,
                    Err(e) => Err(e),
                };
                (id, result)
            })
            .buffer_unordered(RESTORE_CONCURRENCY)
            .collect()
            .await;

        let mut report = RestoreReport::default();
        for (id, result) in results {
            match result {
                Ok(_) => report.restored.push(id),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to restore session");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        report.restored.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            restored = report.restored.len(),
            failed = report.failed.len(),
            "Session restore finished"
        );
        Ok(report)
    }

    /// Register a persisted session with its stored credential and settings
    async fn register(&self, record: &SessionRecord) -> DomainResult<()> {
        let identity = record.identity.as_ref().ok_or(DomainError::AuthenticationRequired)?;
        self.registry
            .create_with_identity(&record.id, identity)
            .await?;

        self.registry.mutate(&record.id, |s| {
            s.proxy = record.proxy.clone();
            s.webhook = record.webhook.clone();
        })?;
        if record.proxy.is_some() {
            self.registry
                .client(&record.id)?
                .set_proxy(record.proxy.as_ref())?;
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_status(&self, id: &SessionId) -> DomainResult<SessionStatus> {
        self.registry.read(id, |s| s.status)
    }

    pub fn get_session(&self, id: &SessionId) -> DomainResult<SessionSnapshot> {
        self.registry.get(id)
    }

    /// Active pairing code; `None` unless the session is pairing
    pub fn get_pairing_code(&self, id: &SessionId) -> DomainResult<Option<String>> {
        let status = self.get_status(id)?;
        if !status.allows_pairing_code() {
            return Ok(None);
        }
        Ok(self.pairing.current(id))
    }

    pub fn list_sessions(&self) -> Vec<SessionSnapshot> {
        self.registry.list()
    }

    /// Connection telemetry; kept after the session is removed
    pub fn connection_info(&self, id: &SessionId) -> Option<ConnectionInfo> {
        self.connections.connection_info(id)
    }

    pub fn all_connection_info(&self) -> Vec<(SessionId, ConnectionInfo)> {
        self.connections.all_connection_info()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Route a session's transport through `proxy` (None clears it)
    #[instrument(skip(self, proxy), fields(session_id = %id))]
    pub async fn set_proxy(
        &self,
        id: &SessionId,
        proxy: Option<ProxyEndpoint>,
    ) -> DomainResult<SessionSnapshot> {
        self.registry.client(id)?.set_proxy(proxy.as_ref())?;
        self.registry.mutate(id, |s| s.proxy = proxy.clone())?;
        self.repository.update_proxy(id, proxy.as_ref()).await?;
        info!(session_id = %id, proxy = ?proxy.as_ref().map(|p| p.url.as_str()), "Proxy updated");
        self.registry.get(id)
    }

    /// Send a session's notifications to `webhook` (None falls back to the default)
    #[instrument(skip(self, webhook), fields(session_id = %id))]
    pub async fn set_webhook(
        &self,
        id: &SessionId,
        webhook: Option<WebhookTarget>,
    ) -> DomainResult<SessionSnapshot> {
        self.registry.mutate(id, |s| s.webhook = webhook.clone())?;
        self.repository.update_webhook(id, webhook.as_ref()).await?;
        info!(session_id = %id, webhook = ?webhook.as_ref().map(WebhookTarget::url), "Webhook updated");
        self.registry.get(id)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop background work and disconnect every session
    pub async fn shutdown(&self) {
        info!(sessions = self.registry.len(), "Shutting down session manager");
        self.background.cancel();
        self.connections.shutdown().await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
    }

    async fn rollback(&self, id: &SessionId) {
        if let Err(e) = self.registry.remove(id).await {
            warn!(session_id = %id, error = %e, "Failed to roll back session registration");
        }
    }
}
