//! Session manager wiring

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use courier_common::AppConfig;
use courier_core::{
    ClientFactory, CredentialStore, SessionRepository, WebhookNotifier, WebhookTarget,
};

use crate::connection::{ConnectionManager, ConnectionPolicy, ConnectionTracker};
use crate::events::{DispatcherConfig, EventDispatcher, SideEffects};
use crate::pairing::{PairingConfig, PairingManager};
use crate::registry::SessionRegistry;

use super::manager::SessionManager;

const DEFAULT_SIDE_EFFECT_CONCURRENCY: usize = 64;

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    factory: Arc<dyn ClientFactory>,
    credentials: Arc<dyn CredentialStore>,
    repository: Arc<dyn SessionRepository>,
    notifier: Arc<dyn WebhookNotifier>,
    policy: ConnectionPolicy,
    pairing: PairingConfig,
    default_webhook: Option<WebhookTarget>,
    side_effect_concurrency: usize,
}

impl SessionManagerBuilder {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        credentials: Arc<dyn CredentialStore>,
        repository: Arc<dyn SessionRepository>,
        notifier: Arc<dyn WebhookNotifier>,
    ) -> Self {
        Self {
            factory,
            credentials,
            repository,
            notifier,
            policy: ConnectionPolicy::default(),
            pairing: PairingConfig::default(),
            default_webhook: None,
            side_effect_concurrency: DEFAULT_SIDE_EFFECT_CONCURRENCY,
        }
    }

    /// Apply the session, pairing and webhook sections of `config`
    #[must_use]
    pub fn with_config(self, config: &AppConfig) -> Self {
        let default_webhook = config
            .webhook
            .default_url
            .as_deref()
            .and_then(WebhookTarget::new);

        self.policy(ConnectionPolicy::from(&config.session))
            .pairing(PairingConfig::from(&config.pairing))
            .default_webhook(default_webhook)
            .side_effect_concurrency(config.session.side_effect_concurrency)
    }

    #[must_use]
    pub fn policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn pairing(mut self, pairing: PairingConfig) -> Self {
        self.pairing = pairing;
        self
    }

    #[must_use]
    pub fn default_webhook(mut self, target: Option<WebhookTarget>) -> Self {
        self.default_webhook = target;
        self
    }

    #[must_use]
    pub fn side_effect_concurrency(mut self, concurrency: usize) -> Self {
        self.side_effect_concurrency = concurrency;
        self
    }

    /// Wire the components and start the background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<SessionManager> {
        let registry = Arc::new(SessionRegistry::new(self.factory, self.credentials));
        let pairing = Arc::new(PairingManager::new(self.pairing));
        let tracker = Arc::new(ConnectionTracker::new());
        let (losses_tx, losses_rx) = mpsc::unbounded_channel();

        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&pairing),
            Arc::clone(&tracker),
            Arc::clone(&self.repository),
            self.notifier,
            SideEffects::new(self.side_effect_concurrency),
            losses_tx,
            DispatcherConfig {
                default_webhook: self.default_webhook,
            },
        ));

        let connections = Arc::new(ConnectionManager::new(
            Arc::clone(&registry),
            Arc::clone(&pairing),
            dispatcher,
            Arc::clone(&self.repository),
            tracker,
            self.policy,
        ));

        let background = CancellationToken::new();
        let tasks = vec![
            pairing.start_cleanup(background.child_token()),
            connections.spawn_loss_worker(losses_rx),
        ];

        info!(
            connect_timeout = ?self.policy.connect_timeout,
            max_attempts = self.policy.max_attempts,
            code_ttl = ?self.pairing.code_ttl,
            "Session manager started"
        );

        Arc::new(SessionManager::new(
            registry,
            pairing,
            connections,
            self.repository,
            background,
            tasks,
        ))
    }
}
