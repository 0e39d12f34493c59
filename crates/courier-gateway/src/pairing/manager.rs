//! Pairing manager

use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_common::PairingSettings;
use courier_core::{DomainError, DomainResult, PairingEvent, PairingStream, SessionId};

use super::record::PairingRecord;

/// Pairing tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingConfig {
    /// Lifetime of a single pairing code
    pub code_ttl: Duration,
    /// Interval of the expired-code sweep
    pub sweep_interval: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

impl From<&PairingSettings> for PairingConfig {
    fn from(settings: &PairingSettings) -> Self {
        Self {
            code_ttl: Duration::from_secs(settings.code_ttl_secs),
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
        }
    }
}

#[derive(Debug, Default)]
struct PairingStore {
    codes: HashMap<SessionId, PairingRecord>,
    errors: HashMap<SessionId, String>,
}

impl PairingStore {
    /// Drop the code for `id` only if it still belongs to `attempt`
    fn remove_attempt(&mut self, id: &SessionId, attempt: u64) {
        if self.codes.get(id).is_some_and(|r| r.attempt == attempt) {
            self.codes.remove(id);
        }
    }
}

/// Receiving side of a pairing attempt
///
/// Every pairing event is echoed here after the code store has been
/// updated, so a caller observing `Success` also observes the cleared code.
#[derive(Debug)]
pub struct PairingHandle {
    session_id: SessionId,
    events: mpsc::UnboundedReceiver<PairingEvent>,
}

impl PairingHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Next pairing event; `None` once the attempt ended
    pub async fn next_event(&mut self) -> Option<PairingEvent> {
        self.events.recv().await
    }

    /// Wait for the first code of the attempt
    pub async fn first_code(&mut self) -> DomainResult<String> {
        while let Some(event) = self.events.recv().await {
            match event {
                PairingEvent::Code { code } => return Ok(code),
                PairingEvent::Timeout => return Err(DomainError::PairingTimeout),
                PairingEvent::Error { message } => return Err(DomainError::PairingError(message)),
                PairingEvent::Success => {
                    return Err(DomainError::PairingError(
                        "pairing completed before a code was issued".to_string(),
                    ))
                }
            }
        }
        Err(DomainError::PairingError(
            "pairing stream closed before a code was issued".to_string(),
        ))
    }
}

/// Owns the pairing code of every session
pub struct PairingManager {
    store: Arc<RwLock<PairingStore>>,
    config: PairingConfig,
    attempts: AtomicU64,
}

impl PairingManager {
    pub fn new(config: PairingConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(PairingStore::default())),
            config,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Start consuming a client's pairing stream
    ///
    /// The stream is drained in a spawned task until a terminal event, the
    /// end of the stream, or `cancel`.
    pub fn generate(
        &self,
        id: SessionId,
        stream: PairingStream,
        cancel: CancellationToken,
    ) -> PairingHandle {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        self.store.write().errors.remove(&id);

        let (echo, events) = mpsc::unbounded_channel();
        let consumer = Consumer {
            store: Arc::clone(&self.store),
            id: id.clone(),
            attempt,
            ttl: self.config.code_ttl,
            echo,
        };
        tokio::spawn(consumer.run(stream, cancel));

        PairingHandle {
            session_id: id,
            events,
        }
    }

    /// Active code for `id`; an expired code is evicted and reported absent
    pub fn current(&self, id: &SessionId) -> Option<String> {
        self.record(id).map(|r| r.code)
    }

    /// Active record for `id`, with the same eviction as [`Self::current`]
    pub fn record(&self, id: &SessionId) -> Option<PairingRecord> {
        let now = Instant::now();
        {
            let store = self.store.read();
            match store.codes.get(id) {
                None => return None,
                Some(record) if record.is_valid_at(now) => return Some(record.clone()),
                Some(_) => {}
            }
        }

        let mut store = self.store.write();
        if store.codes.get(id).is_some_and(|r| !r.is_valid_at(now)) {
            store.codes.remove(id);
            debug!(session_id = %id, "Evicted expired pairing code");
        }
        None
    }

    /// Whether `id` holds an unexpired code; never evicts
    pub fn is_valid(&self, id: &SessionId) -> bool {
        self.store
            .read()
            .codes
            .get(id)
            .is_some_and(PairingRecord::is_valid)
    }

    pub fn clear(&self, id: &SessionId) -> bool {
        self.store.write().codes.remove(id).is_some()
    }

    /// Error reported by the last failed attempt of `id`
    pub fn last_error(&self, id: &SessionId) -> Option<String> {
        self.store.read().errors.get(id).cloned()
    }

    /// Forget everything about `id`
    pub fn forget(&self, id: &SessionId) {
        let mut store = self.store.write();
        store.codes.remove(id);
        store.errors.remove(id);
    }

    /// Number of stored codes, expired or not
    pub fn len(&self) -> usize {
        self.store.read().codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().codes.is_empty()
    }

    /// Evict every expired code; returns how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write();
        let before = store.codes.len();
        store.codes.retain(|_, record| record.is_valid_at(now));
        before - store.codes.len()
    }

    /// Run [`Self::sweep_expired`] every `sweep_interval` until `cancel`
    pub fn start_cleanup(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = manager.sweep_expired();
                        if evicted > 0 {
                            debug!(evicted, "Swept expired pairing codes");
                        }
                    }
                }
            }
            debug!("Pairing sweep stopped");
        })
    }
}

/// Pairing stream consumer for one attempt
struct Consumer {
    store: Arc<RwLock<PairingStore>>,
    id: SessionId,
    attempt: u64,
    ttl: Duration,
    echo: mpsc::UnboundedSender<PairingEvent>,
}

impl Consumer {
    async fn run(self, mut stream: PairingStream, cancel: CancellationToken) {
        let id = &self.id;
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(session_id = %id, "Pairing attempt cancelled");
                    return;
                }
                event = stream.next() => event,
            };

            let Some(event) = event else {
                self.store.write().remove_attempt(id, self.attempt);
                debug!(session_id = %id, "Pairing stream closed");
                return;
            };

            self.apply(&event);
            let terminal = event.is_terminal();
            // The receiver is gone once the connect path stopped watching.
            let _ = self.echo.send(event);
            if terminal {
                return;
            }
        }
    }

    fn apply(&self, event: &PairingEvent) {
        let id = &self.id;
        match event {
            PairingEvent::Code { code } => {
                let record = PairingRecord::new(code.clone(), self.ttl, self.attempt);
                self.store.write().codes.insert(id.clone(), record);
                info!(session_id = %id, ttl_secs = self.ttl.as_secs(), "Pairing code issued");
            }
            PairingEvent::Success => {
                let mut store = self.store.write();
                store.remove_attempt(id, self.attempt);
                store.errors.remove(id);
                info!(session_id = %id, "Pairing succeeded");
            }
            PairingEvent::Timeout => {
                self.store.write().remove_attempt(id, self.attempt);
                warn!(session_id = %id, "Pairing timed out");
            }
            PairingEvent::Error { message } => {
                let mut store = self.store.write();
                store.remove_attempt(id, self.attempt);
                store.errors.insert(id.clone(), message.clone());
                warn!(session_id = %id, error = %message, "Pairing failed");
            }
        }
    }
}
