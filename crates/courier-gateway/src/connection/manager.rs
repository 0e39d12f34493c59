//! Connection manager
//!
//! Owns every transition of the session state machine that is driven from
//! the gateway side: connect (pairing or resume), bounded retries, explicit
//! disconnect and reconnect, logout, and the auto-reconnect loop started by
//! connection losses. Transitions driven by the remote side are handled by
//! the [`EventDispatcher`].

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use courier_core::{
    DomainError, DomainResult, PairingEvent, ProtocolClient, SessionId, SessionRepository,
    SessionStatus,
};

use crate::events::{EventDispatcher, EventSubscription};
use crate::pairing::{PairingHandle, PairingManager};
use crate::registry::SessionRegistry;

use super::policy::ConnectionPolicy;
use super::tracker::{ConnectionInfo, ConnectionTracker};

/// Result of a successful connect call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConnectOutcome {
    /// The session is unpaired; show `code` to the user
    PairingRequired { code: String },
    /// The session resumed with its stored credential
    Connected,
}

struct ReconnectTask {
    generation: u64,
    cancel: CancellationToken,
}

/// Drives connection state transitions for all sessions
pub struct ConnectionManager {
    registry: Arc<SessionRegistry>,
    pairing: Arc<PairingManager>,
    dispatcher: Arc<EventDispatcher>,
    repository: Arc<dyn SessionRepository>,
    tracker: Arc<ConnectionTracker>,
    policy: ConnectionPolicy,
    reconnects: DashMap<SessionId, ReconnectTask>,
    generations: AtomicU64,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pairing: Arc<PairingManager>,
        dispatcher: Arc<EventDispatcher>,
        repository: Arc<dyn SessionRepository>,
        tracker: Arc<ConnectionTracker>,
        policy: ConnectionPolicy,
    ) -> Self {
        Self {
            registry,
            pairing,
            dispatcher,
            repository,
            tracker,
            policy,
            reconnects: DashMap::new(),
            generations: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Connect a session once
    ///
    /// Unpaired sessions return the first pairing code; sessions with an
    /// identity resume with their stored credential.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn connect(self: &Arc<Self>, id: &SessionId) -> DomainResult<ConnectOutcome> {
        self.connect_inner(id, true).await
    }

    /// Connect with up to `max_attempts` tries, retrying transport failures only
    #[instrument(skip(self, cancel), fields(session_id = %id))]
    pub async fn connect_with_retry(
        self: &Arc<Self>,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> DomainResult<ConnectOutcome> {
        self.retry(id, cancel, true).await
    }

    async fn retry(
        self: &Arc<Self>,
        id: &SessionId,
        cancel: &CancellationToken,
        allow_pairing: bool,
    ) -> DomainResult<ConnectOutcome> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            attempt += 1;

            match self.connect_inner(id, allow_pairing).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(session_id = %id, attempts = attempt, error = %e, "Connect retries exhausted");
                    return Err(DomainError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        session_id = %id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Connect attempt failed; retrying"
                    );
                    self.tracker.record_retry(id);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(DomainError::Cancelled),
                        () = sleep(self.policy.retry_delay) => {}
                    }
                }
            }
        }
    }

    async fn connect_inner(
        self: &Arc<Self>,
        id: &SessionId,
        allow_pairing: bool,
    ) -> DomainResult<ConnectOutcome> {
        let (status, has_identity, in_flight) = self.registry.read(id, |s| {
            let in_flight = s.attempt.clone().filter(|t| !t.is_cancelled());
            (s.status, s.identity.is_some(), in_flight)
        })?;

        if status == SessionStatus::Connected {
            return Err(DomainError::AlreadyConnected);
        }

        if status == SessionStatus::Connecting && !has_identity {
            if let Some(attempt) = in_flight {
                if let Some(code) = self.pairing.current(id) {
                    debug!(session_id = %id, "Returning the code of the pairing attempt in flight");
                    return Ok(ConnectOutcome::PairingRequired { code });
                }
                // No unexpired code left: start over with a fresh pairing cycle.
                self.abandon(id, &attempt, "pairing code expired").await;
            }
        }

        let client = self.registry.client(id)?;
        if has_identity {
            self.resume(id, client).await
        } else if allow_pairing {
            self.pair(id, client).await
        } else {
            Err(DomainError::AuthenticationRequired)
        }
    }

    /// New-session path
    async fn pair(
        self: &Arc<Self>,
        id: &SessionId,
        client: Arc<dyn ProtocolClient>,
    ) -> DomainResult<ConnectOutcome> {
        let stream = client.pairing_events().await?;
        let attempt = CancellationToken::new();
        let deadline = Instant::now() + self.policy.connect_timeout;

        self.begin_attempt(id, &attempt)?;
        let mut handle = self.pairing.generate(id.clone(), stream, attempt.clone());

        if let Err(e) = client.connect().await {
            let err = DomainError::from(e);
            self.fail_attempt(id, &attempt, &err).await;
            return Err(err);
        }

        let first = tokio::select! {
            biased;
            () = attempt.cancelled() => Err(DomainError::Cancelled),
            code = handle.first_code() => code,
            () = sleep_until(deadline) => Err(DomainError::PairingTimeout),
        };
        let code = match first {
            Ok(code) => code,
            Err(e) => {
                self.abandon(id, &attempt, &e.to_string()).await;
                return Err(e);
            }
        };

        let record = self.pairing.record(id);
        self.registry.mutate(id, |s| {
            if s.status == SessionStatus::Connecting && !attempt.is_cancelled() {
                s.pairing = record;
            }
        })?;
        info!(session_id = %id, "Pairing code issued");

        self.spawn_pairing_watcher(id.clone(), handle, attempt, deadline);
        Ok(ConnectOutcome::PairingRequired { code })
    }

    /// Existing-session path
    async fn resume(
        &self,
        id: &SessionId,
        client: Arc<dyn ProtocolClient>,
    ) -> DomainResult<ConnectOutcome> {
        if client.known_identity().is_none() {
            return Err(DomainError::Configuration(format!(
                "session {id} has an identity but no stored credential"
            )));
        }

        let attempt = CancellationToken::new();
        self.begin_attempt(id, &attempt)?;

        let connected = tokio::select! {
            biased;
            () = attempt.cancelled() => Err(DomainError::Cancelled),
            result = timeout(self.policy.connect_timeout, client.connect()) => match result {
                Ok(result) => result.map_err(DomainError::from),
                Err(_) => Err(DomainError::ConnectFailure(format!(
                    "connect timed out after {:?}",
                    self.policy.connect_timeout
                ))),
            },
        };

        if let Err(e) = connected {
            if !matches!(e, DomainError::Cancelled) {
                self.fail_attempt(id, &attempt, &e).await;
            }
            return Err(e);
        }

        let marked = self.registry.mutate(id, |s| {
            if attempt.is_cancelled() {
                return false;
            }
            s.set_status(SessionStatus::Connected);
            s.attempt = None;
            true
        })?;
        if !marked {
            return Err(DomainError::Cancelled);
        }

        self.tracker.record_connected(id);
        self.persist_status(id, SessionStatus::Connected).await;
        info!(session_id = %id, "Session resumed");
        Ok(ConnectOutcome::Connected)
    }

    /// Enter `connecting` with `attempt` as the only live attempt
    fn begin_attempt(&self, id: &SessionId, attempt: &CancellationToken) -> DomainResult<()> {
        self.registry.mutate(id, |s| {
            s.cancel_attempt();
            s.attempt = Some(attempt.clone());
            s.set_status(SessionStatus::Connecting);
            if s.subscription.is_none() {
                s.subscription = Some(self.dispatcher.subscribe(id, s.client.as_ref()));
            }
        })?;
        self.tracker.record_attempt(id);
        Ok(())
    }

    /// Transport failure: `error` status, subscription dropped
    async fn fail_attempt(&self, id: &SessionId, attempt: &CancellationToken, err: &DomainError) {
        let detached = self.registry.mutate(id, |s| {
            if attempt.is_cancelled() {
                return None;
            }
            s.cancel_attempt();
            s.set_status(SessionStatus::Error);
            Some((Arc::clone(&s.client), s.subscription.take()))
        });
        let Ok(Some((client, subscription))) = detached else {
            return;
        };

        close_subscription(subscription, client.as_ref());
        self.pairing.clear(id);
        self.tracker.record_failure(id, err);
        warn!(session_id = %id, error = %err, "Connect attempt failed");
        self.persist_status(id, SessionStatus::Error).await;
    }

    /// Give up a pairing attempt that is still the live one
    async fn abandon(&self, id: &SessionId, attempt: &CancellationToken, reason: &str) {
        let detached = self.registry.mutate(id, |s| {
            if attempt.is_cancelled() || s.status != SessionStatus::Connecting {
                return None;
            }
            s.cancel_attempt();
            s.set_status(SessionStatus::Disconnected);
            Some((Arc::clone(&s.client), s.subscription.take()))
        });
        let Ok(Some((client, subscription))) = detached else {
            return;
        };

        close_subscription(subscription, client.as_ref());
        client.disconnect().await;
        self.pairing.clear(id);
        self.tracker.record_disconnected(id, Some(reason.to_string()));
        warn!(session_id = %id, reason, "Pairing abandoned");
        self.persist_status(id, SessionStatus::Disconnected).await;
    }

    fn spawn_pairing_watcher(
        self: &Arc<Self>,
        id: SessionId,
        mut handle: PairingHandle,
        attempt: CancellationToken,
        deadline: Instant,
    ) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = attempt.cancelled() => {
                        debug!(session_id = %id, "Pairing watcher cancelled");
                        return;
                    }
                    () = sleep_until(deadline) => {
                        manager.abandon(&id, &attempt, "pairing timed out").await;
                        return;
                    }
                    event = handle.next_event() => match event {
                        Some(PairingEvent::Code { .. }) => {
                            let record = manager.pairing.record(&id);
                            let refreshed = manager.registry.mutate(&id, |s| {
                                if s.status == SessionStatus::Connecting && !attempt.is_cancelled() {
                                    s.pairing = record;
                                }
                            });
                            if refreshed.is_err() {
                                return;
                            }
                            debug!(session_id = %id, "Pairing code refreshed");
                        }
                        Some(PairingEvent::Success) => {
                            info!(session_id = %id, "Pairing completed");
                            return;
                        }
                        Some(PairingEvent::Timeout) => {
                            manager.abandon(&id, &attempt, "pairing timed out").await;
                            return;
                        }
                        Some(PairingEvent::Error { message }) => {
                            manager.abandon(&id, &attempt, &message).await;
                            return;
                        }
                        None => {
                            manager.abandon(&id, &attempt, "pairing stream closed").await;
                            return;
                        }
                    },
                }
            }
        });
    }

    // ========================================================================
    // Disconnect / Reconnect / Logout
    // ========================================================================

    /// Close a session's connection and stop its automatic reconnects
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn disconnect(&self, id: &SessionId) -> DomainResult<()> {
        self.cancel_reconnect(id);

        let detached = self.registry.mutate(id, |s| {
            if s.status == SessionStatus::Disconnected {
                return None;
            }
            s.cancel_attempt();
            s.set_status(SessionStatus::Disconnected);
            Some((Arc::clone(&s.client), s.subscription.take()))
        })?;
        let Some((client, subscription)) = detached else {
            return Err(DomainError::NotConnected);
        };

        close_subscription(subscription, client.as_ref());
        client.disconnect().await;
        self.pairing.clear(id);
        self.tracker
            .record_disconnected(id, Some("disconnected by request".to_string()));

        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        self.persist("persist_disconnected", id, async move {
            repository
                .update_status(&session_id, SessionStatus::Disconnected)
                .await
        })
        .await?;
        info!(session_id = %id, "Session disconnected");
        Ok(())
    }

    /// Disconnect, wait `reconnect_delay`, then connect again
    #[instrument(skip(self, cancel), fields(session_id = %id))]
    pub async fn reconnect(
        self: &Arc<Self>,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> DomainResult<ConnectOutcome> {
        match self.disconnect(id).await {
            Ok(()) | Err(DomainError::NotConnected) => {}
            Err(e) => return Err(e),
        }

        self.tracker.record_retry(id);
        self.registry
            .mutate(id, |s| s.set_status(SessionStatus::Reconnecting))?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = self.registry.mutate(id, |s| {
                    if s.status == SessionStatus::Reconnecting {
                        s.set_status(SessionStatus::Disconnected);
                    }
                });
                return Err(DomainError::Cancelled);
            }
            () = sleep(self.policy.reconnect_delay) => {}
        }

        self.connect(id).await
    }

    /// Deauthenticate the session's device
    ///
    /// The identity is dropped locally as well, so the next connect pairs a
    /// new device.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn logout(&self, id: &SessionId) -> DomainResult<()> {
        self.cancel_reconnect(id);

        let client = self.registry.client(id)?;
        client.logout().await?;

        let (client, subscription) = self.registry.mutate(id, |s| {
            s.identity = None;
            s.cancel_attempt();
            s.set_status(SessionStatus::Disconnected);
            (Arc::clone(&s.client), s.subscription.take())
        })?;

        close_subscription(subscription, client.as_ref());
        client.disconnect().await;
        self.pairing.clear(id);
        self.tracker
            .record_disconnected(id, Some("logged out".to_string()));

        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        self.persist("persist_logged_out", id, async move {
            repository.update_identity(&session_id, None).await?;
            repository
                .update_status(&session_id, SessionStatus::Disconnected)
                .await
        })
        .await?;
        info!(session_id = %id, "Session logged out");
        Ok(())
    }

    // ========================================================================
    // Auto-reconnect
    // ========================================================================

    /// React to an unsolicited connection loss
    ///
    /// Starts a background reconnect loop for sessions with a known identity.
    /// Returns whether a loop was started.
    pub fn handle_connection_lost(self: &Arc<Self>, id: &SessionId) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }

        match self.registry.read(id, |s| s.identity.is_some()) {
            Ok(true) => {}
            Ok(false) => {
                info!(session_id = %id, "Connection lost on unpaired session; not reconnecting");
                return false;
            }
            Err(_) => {
                debug!(session_id = %id, "Connection lost on removed session");
                return false;
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.shutdown.child_token();
        match self.reconnects.entry(id.clone()) {
            Entry::Occupied(_) => {
                debug!(session_id = %id, "Automatic reconnect already scheduled");
                return false;
            }
            Entry::Vacant(entry) => {
                entry.insert(ReconnectTask {
                    generation,
                    cancel: cancel.clone(),
                });
            }
        }

        info!(
            session_id = %id,
            delay = ?self.policy.auto_reconnect_delay,
            "Scheduling automatic reconnect"
        );

        let manager = Arc::clone(self);
        let id = id.clone();
        tokio::spawn(async move {
            manager.auto_reconnect(&id, &cancel).await;
            manager
                .reconnects
                .remove_if(&id, |_, task| task.generation == generation);
        });
        true
    }

    async fn auto_reconnect(self: &Arc<Self>, id: &SessionId, cancel: &CancellationToken) {
        let mut wait = self.policy.auto_reconnect_delay;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(session_id = %id, "Automatic reconnect cancelled");
                    return;
                }
                () = sleep(wait) => {}
            }

            let state = self.registry.read(id, |s| {
                (s.status, s.identity.is_some(), s.attempt_in_flight())
            });
            match state {
                Err(_) => {
                    debug!(session_id = %id, "Session removed; stopping automatic reconnect");
                    return;
                }
                Ok((_, false, _)) => {
                    info!(session_id = %id, "Identity lost; stopping automatic reconnect");
                    return;
                }
                Ok((SessionStatus::Connected, _, _)) | Ok((_, _, true)) => {
                    debug!(session_id = %id, "Session already connecting; stopping automatic reconnect");
                    return;
                }
                Ok(_) => {}
            }

            self.tracker.record_retry(id);
            if self
                .registry
                .mutate(id, |s| s.set_status(SessionStatus::Reconnecting))
                .is_err()
            {
                return;
            }

            match self.retry(id, cancel, false).await {
                Ok(_) => {
                    info!(session_id = %id, "Automatic reconnect succeeded");
                    return;
                }
                Err(DomainError::Cancelled) => return,
                Err(e) if e.is_retryable() => {
                    warn!(
                        session_id = %id,
                        error = %e,
                        retry_in = ?self.policy.auto_reconnect_interval,
                        "Automatic reconnect failed"
                    );
                    wait = self.policy.auto_reconnect_interval;
                }
                Err(e) => {
                    error!(session_id = %id, error = %e, "Automatic reconnect gave up");
                    return;
                }
            }
        }
    }

    /// Stop the automatic reconnect loop of `id`, if one is running
    pub fn cancel_reconnect(&self, id: &SessionId) -> bool {
        match self.reconnects.remove(id) {
            Some((_, task)) => {
                task.cancel.cancel();
                debug!(session_id = %id, "Automatic reconnect stopped");
                true
            }
            None => false,
        }
    }

    /// Whether an automatic reconnect loop is running for `id`
    pub fn reconnect_scheduled(&self, id: &SessionId) -> bool {
        self.reconnects.contains_key(id)
    }

    /// Feed connection losses reported by the dispatcher into
    /// [`Self::handle_connection_lost`]
    pub fn spawn_loss_worker(
        self: &Arc<Self>,
        mut losses: mpsc::UnboundedReceiver<SessionId>,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let id = tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    id = losses.recv() => match id {
                        Some(id) => id,
                        None => break,
                    },
                };
                manager.handle_connection_lost(&id);
            }
            debug!("Connection loss worker stopped");
        })
    }

    // ========================================================================
    // Telemetry / Shutdown
    // ========================================================================

    pub fn connection_info(&self, id: &SessionId) -> Option<ConnectionInfo> {
        self.tracker.get(id)
    }

    pub fn all_connection_info(&self) -> Vec<(SessionId, ConnectionInfo)> {
        self.tracker.all()
    }

    /// Cancel every background loop and disconnect every session
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.reconnects.clear();

        for id in self.registry.ids() {
            match self.disconnect(&id).await {
                Ok(()) | Err(DomainError::NotConnected) => {}
                Err(e) => warn!(session_id = %id, error = %e, "Disconnect during shutdown failed"),
            }
        }
        info!("Connection manager stopped");
    }

    /// Drop the datastore lane of a removed session after its queued writes
    pub fn release(&self, id: &SessionId) {
        self.dispatcher.side_effects().close_lane(id);
    }

    /// Run a datastore write behind the session's queued event writes
    pub(crate) async fn persist<F>(&self, task: &'static str, id: &SessionId, write: F) -> DomainResult<()>
    where
        F: std::future::Future<Output = DomainResult<()>> + Send + 'static,
    {
        self.dispatcher.side_effects().run_ordered(task, id, write).await
    }

    async fn persist_status(&self, id: &SessionId, status: SessionStatus) {
        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        let written = self
            .persist("persist_status", id, async move {
                repository.update_status(&session_id, status).await
            })
            .await;
        if let Err(e) = written {
            warn!(session_id = %id, status = %status, error = %e, "Failed to persist session status");
        }
    }
}

fn close_subscription(subscription: Option<EventSubscription>, client: &dyn ProtocolClient) {
    if let Some(subscription) = subscription {
        subscription.close(client);
    }
}
