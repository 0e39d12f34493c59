//! Event dispatcher
//!
//! Routes protocol events to registry updates, persistence and webhooks.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use courier_core::{
    DomainError, EventHandler, Identity, ProtocolClient, ProtocolEvent, SessionId,
    SessionRepository, SessionStatus, WebhookDelivery, WebhookNotifier, WebhookTarget,
};

use crate::connection::ConnectionTracker;
use crate::pairing::PairingManager;
use crate::registry::SessionRegistry;

use super::side_effects::SideEffects;
use super::subscription::EventSubscription;

/// Dispatcher settings
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Webhook used for sessions without their own target
    pub default_webhook: Option<WebhookTarget>,
}

/// Fans protocol events out to the registry, the datastore and webhooks
pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    pairing: Arc<PairingManager>,
    tracker: Arc<ConnectionTracker>,
    repository: Arc<dyn SessionRepository>,
    notifier: Arc<dyn WebhookNotifier>,
    side_effects: SideEffects,
    losses: mpsc::UnboundedSender<SessionId>,
    config: DispatcherConfig,
}

impl EventDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        pairing: Arc<PairingManager>,
        tracker: Arc<ConnectionTracker>,
        repository: Arc<dyn SessionRepository>,
        notifier: Arc<dyn WebhookNotifier>,
        side_effects: SideEffects,
        losses: mpsc::UnboundedSender<SessionId>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            pairing,
            tracker,
            repository,
            notifier,
            side_effects,
            losses,
            config,
        }
    }

    /// Spawner shared with the connection manager, so every datastore write
    /// for a session goes through the same lane
    pub fn side_effects(&self) -> &SideEffects {
        &self.side_effects
    }

    /// Register the gateway callback on `client` and start the session pump
    pub fn subscribe(
        self: &Arc<Self>,
        id: &SessionId,
        client: &dyn ProtocolClient,
    ) -> EventSubscription {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProtocolEvent>();
        let handler: EventHandler = Arc::new(move |event| {
            // Fails only after the pump stopped.
            let _ = tx.send(event);
        });
        let handler_id = client.register_event_handler(handler);

        let pump = CancellationToken::new();
        let stop = pump.clone();
        let dispatcher = Arc::clone(self);
        let session_id = id.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    () = stop.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                dispatcher.process(&session_id, event);
            }
            debug!(session_id = %session_id, "Event pump stopped");
        });

        debug!(session_id = %id, handler = %handler_id, "Event subscription attached");
        EventSubscription::new(handler_id, pump)
    }

    /// Apply one protocol event
    ///
    /// Never blocks on I/O: registry updates happen inline, everything else
    /// is handed to [`SideEffects`]. Datastore writes use the session's
    /// ordered lane; webhooks are delivered independently.
    pub fn process(&self, id: &SessionId, event: ProtocolEvent) {
        trace!(session_id = %id, kind = event.kind(), "Processing protocol event");

        match event {
            ProtocolEvent::Connected => self.on_connected(id, None, "connected", None),
            ProtocolEvent::PairSuccess { identity, platform } => {
                self.on_connected(id, Some(identity), "pair_success", platform);
            }
            ProtocolEvent::Disconnected => self.on_disconnected(id),
            ProtocolEvent::LoggedOut { reason } => self.on_logged_out(id, reason),
            ProtocolEvent::PairError { identity, error } => {
                self.on_pair_error(id, identity, error);
            }
            ProtocolEvent::Message(summary) => {
                self.on_activity(id, "message", serde_json::to_value(summary));
            }
            ProtocolEvent::Receipt(summary) => {
                self.on_activity(id, "receipt", serde_json::to_value(summary));
            }
            ProtocolEvent::Presence(summary) => {
                self.on_activity(id, "presence", serde_json::to_value(summary));
            }
            ProtocolEvent::Other { kind } => {
                debug!(session_id = %id, kind = %kind, "Ignoring unhandled protocol event");
            }
        }
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// `Connected` and `PairSuccess`
    ///
    /// The client's bound credential is the authority on identity; the event
    /// payload only fills in when the client does not report one.
    fn on_connected(
        &self,
        id: &SessionId,
        reported: Option<Identity>,
        event: &'static str,
        platform: Option<String>,
    ) {
        let updated = self.registry.mutate(id, |s| {
            let previous = s.identity.clone();
            if let Some(identity) = s.client.known_identity().or(reported) {
                s.identity = Some(identity);
            }
            s.set_status(SessionStatus::Connected);
            s.attempt = None;
            (previous, s.identity.clone(), s.webhook.clone())
        });
        let Some((previous, identity, webhook)) = self.live(id, updated) else {
            return;
        };

        self.pairing.clear(id);
        self.tracker.record_connected(id);
        if previous != identity {
            info!(session_id = %id, identity = ?identity, "Session identity captured");
        }
        info!(session_id = %id, event, "Session connected");

        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        let persisted = identity.clone();
        self.side_effects.enqueue("persist_connected", id, async move {
            if let Some(identity) = &persisted {
                repository.update_identity(&session_id, Some(identity)).await?;
            }
            repository
                .update_status(&session_id, SessionStatus::Connected)
                .await
        });

        let payload = match platform {
            Some(platform) => json!({ "identity": identity, "platform": platform }),
            None => json!({ "identity": identity }),
        };
        self.notify(id, webhook, event, payload);
    }

    fn on_disconnected(&self, id: &SessionId) {
        let updated = self.registry.mutate(id, |s| {
            s.set_status(SessionStatus::Disconnected);
            (s.identity.clone(), s.webhook.clone())
        });
        let Some((identity, webhook)) = self.live(id, updated) else {
            return;
        };

        self.tracker.record_disconnected(id, None);
        warn!(session_id = %id, "Connection lost");

        self.persist_status(id, SessionStatus::Disconnected);
        self.notify(id, webhook, "disconnected", json!({ "identity": identity }));

        if self.losses.send(id.clone()).is_err() {
            debug!(session_id = %id, "Connection loss worker stopped; not reconnecting");
        }
    }

    fn on_logged_out(&self, id: &SessionId, reason: Option<String>) {
        let updated = self.registry.mutate(id, |s| {
            let identity = s.identity.take();
            s.set_status(SessionStatus::Disconnected);
            s.cancel_attempt();
            (identity, s.webhook.clone())
        });
        let Some((identity, webhook)) = self.live(id, updated) else {
            return;
        };

        self.pairing.clear(id);
        self.tracker
            .record_disconnected(id, Some(reason.clone().unwrap_or_else(|| "logged out".to_string())));
        warn!(session_id = %id, reason = ?reason, "Session logged out remotely");

        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        self.side_effects.enqueue("persist_logged_out", id, async move {
            repository.update_identity(&session_id, None).await?;
            repository
                .update_status(&session_id, SessionStatus::Disconnected)
                .await
        });

        self.notify(
            id,
            webhook,
            "logged_out",
            json!({ "identity": identity, "reason": reason }),
        );
    }

    fn on_pair_error(&self, id: &SessionId, identity: Option<Identity>, error: String) {
        let Some(webhook) = self.live(id, self.registry.read(id, |s| s.webhook.clone())) else {
            return;
        };

        warn!(session_id = %id, error = %error, "Pairing error reported by client");
        self.notify(
            id,
            webhook,
            "pair_error",
            json!({ "identity": identity, "error": error }),
        );
    }

    fn on_activity(
        &self,
        id: &SessionId,
        event: &'static str,
        summary: Result<Value, serde_json::Error>,
    ) {
        let updated = self.registry.mutate(id, |s| {
            s.touch();
            (s.last_seen, s.webhook.clone())
        });
        let Some((seen, webhook)) = self.live(id, updated) else {
            return;
        };

        self.persist_last_seen(id, seen);

        match summary {
            Ok(payload) => self.notify(id, webhook, event, payload),
            Err(e) => warn!(session_id = %id, event, error = %e, "Failed to encode event summary"),
        }
    }

    // ------------------------------------------------------------------
    // Side effects
    // ------------------------------------------------------------------

    fn persist_status(&self, id: &SessionId, status: SessionStatus) {
        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        self.side_effects.enqueue("persist_status", id, async move {
            repository.update_status(&session_id, status).await
        });
    }

    fn persist_last_seen(&self, id: &SessionId, at: DateTime<Utc>) {
        let repository = Arc::clone(&self.repository);
        let session_id = id.clone();
        self.side_effects.enqueue("persist_last_seen", id, async move {
            repository.update_last_seen(&session_id, at).await
        });
    }

    fn notify(
        &self,
        id: &SessionId,
        webhook: Option<WebhookTarget>,
        event: &'static str,
        payload: Value,
    ) {
        let Some(target) = webhook.or_else(|| self.config.default_webhook.clone()) else {
            trace!(session_id = %id, event, "No webhook target; skipping notification");
            return;
        };

        let delivery = WebhookDelivery::new(target, id.clone(), event, payload);
        let notifier = Arc::clone(&self.notifier);
        self.side_effects.spawn("webhook", id, async move {
            notifier.notify(&delivery).await
        });
    }

    /// Events for sessions removed meanwhile are dropped
    fn live<T>(&self, id: &SessionId, result: Result<T, DomainError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(session_id = %id, error = %e, "Dropping event for unknown session");
                None
            }
        }
    }
}
