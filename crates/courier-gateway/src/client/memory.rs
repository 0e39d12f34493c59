//! In-memory protocol client
//!
//! Behaves like a real client at the port boundary: `connect` opens a fake
//! transport, unpaired clients issue a pairing code, and paired clients emit
//! `Connected`. Tests drive the remote side through the `complete_pairing`,
//! `drop_connection` and `push_pairing` hooks.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use courier_core::{
    ClientError, ClientFactory, CredentialSlot, CredentialStore, EventHandler, HandlerId,
    Identity, PairingEvent, PairingStream, ProtocolClient, ProtocolEvent, ProxyEndpoint,
    RepoResult,
};

const PAIRING_CODE_LEN: usize = 8;

// ============================================================================
// Credential Store
// ============================================================================

/// Credential store keeping device slots in memory
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slots: RwLock<HashMap<Identity, CredentialSlot>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to a slot, as a completed pairing would
    pub fn store(&self, identity: &Identity) -> CredentialSlot {
        self.slots
            .write()
            .entry(identity.clone())
            .or_insert_with(|| CredentialSlot::new(format!("device-{}", uuid::Uuid::new_v4())))
            .clone()
    }

    /// Bind `identity` to an existing slot
    pub fn bind(&self, identity: &Identity, slot: &CredentialSlot) {
        self.slots.write().insert(identity.clone(), slot.clone());
    }

    /// Drop the credential for `identity`
    pub fn forget(&self, identity: &Identity) {
        self.slots.write().remove(identity);
    }

    /// Identity stored in `slot`, if any
    pub fn identity_of(&self, slot: &CredentialSlot) -> Option<Identity> {
        self.slots
            .read()
            .iter()
            .find(|(_, s)| *s == slot)
            .map(|(identity, _)| identity.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn new_slot(&self) -> RepoResult<CredentialSlot> {
        Ok(CredentialSlot::new(format!("device-{}", uuid::Uuid::new_v4())))
    }

    async fn get_slot(&self, identity: &Identity) -> RepoResult<Option<CredentialSlot>> {
        Ok(self.slots.read().get(identity).cloned())
    }
}

// ============================================================================
// Client
// ============================================================================

/// Scriptable in-memory protocol client
pub struct MemoryClient {
    slot: Option<CredentialSlot>,
    credentials: Option<Arc<MemoryCredentialStore>>,
    identity: RwLock<Option<Identity>>,
    connected: AtomicBool,
    handlers: RwLock<HashMap<HandlerId, EventHandler>>,
    next_handler: AtomicU64,
    pairing: Mutex<Option<mpsc::UnboundedSender<PairingEvent>>>,
    pairing_code: Option<String>,
    proxy: RwLock<Option<ProxyEndpoint>>,
    failing_connects: AtomicU32,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
}

impl MemoryClient {
    /// Standalone client; unpaired clients issue a random pairing code
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            slot: None,
            credentials: None,
            identity: RwLock::new(identity),
            connected: AtomicBool::new(false),
            handlers: RwLock::new(HashMap::new()),
            next_handler: AtomicU64::new(1),
            pairing: Mutex::new(None),
            pairing_code: None,
            proxy: RwLock::new(None),
            failing_connects: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
        }
    }

    fn bound(slot: CredentialSlot, credentials: Arc<MemoryCredentialStore>) -> Self {
        let identity = credentials.identity_of(&slot);
        Self {
            slot: Some(slot),
            credentials: Some(credentials),
            ..Self::new(identity)
        }
    }

    fn with_pairing_code(mut self, code: Option<String>) -> Self {
        self.pairing_code = code;
        self
    }

    // ------------------------------------------------------------------
    // Remote-side hooks
    // ------------------------------------------------------------------

    /// Deliver an event to every registered handler
    pub fn emit(&self, event: ProtocolEvent) {
        let handlers: Vec<EventHandler> = self.handlers.read().values().cloned().collect();
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Push an event onto the open pairing stream; terminal events close it
    pub fn push_pairing(&self, event: PairingEvent) -> bool {
        let mut pairing = self.pairing.lock();
        let Some(tx) = pairing.as_ref() else {
            return false;
        };
        let sent = tx.unbounded_send(event.clone()).is_ok();
        if event.is_terminal() {
            *pairing = None;
        }
        sent
    }

    /// Simulate the phone scanning the code and the server accepting it
    pub fn complete_pairing(&self, identity: Identity) {
        *self.identity.write() = Some(identity.clone());
        if let (Some(store), Some(slot)) = (&self.credentials, &self.slot) {
            store.bind(&identity, slot);
        }
        self.push_pairing(PairingEvent::Success);
        self.emit(ProtocolEvent::PairSuccess {
            identity,
            platform: Some("memory".to_string()),
        });
        self.emit(ProtocolEvent::Connected);
    }

    /// Simulate an unsolicited transport loss
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.emit(ProtocolEvent::Disconnected);
    }

    /// Simulate the remote side revoking this device
    pub fn remote_logout(&self, reason: Option<String>) {
        self.clear_credential();
        self.connected.store(false, Ordering::SeqCst);
        self.emit(ProtocolEvent::LoggedOut { reason });
    }

    /// Open the transport without going through `connect`
    pub fn connect_transport(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `connect` fail with a transport error
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn proxy(&self) -> Option<ProxyEndpoint> {
        self.proxy.read().clone()
    }

    pub fn slot(&self) -> Option<&CredentialSlot> {
        self.slot.as_ref()
    }

    fn clear_credential(&self) {
        if let Some(identity) = self.identity.write().take() {
            if let Some(store) = &self.credentials {
                store.forget(&identity);
            }
        }
    }

    fn next_pairing_code(&self) -> String {
        self.pairing_code.clone().unwrap_or_else(|| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(PAIRING_CODE_LEN)
                .map(char::from)
                .collect()
        })
    }
}

#[async_trait]
impl ProtocolClient for MemoryClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Transport("simulated connect failure".to_string()));
        }

        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }

        if self.known_identity().is_some() {
            self.emit(ProtocolEvent::Connected);
        } else {
            let code = self.next_pairing_code();
            self.push_pairing(PairingEvent::Code { code });
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        *self.pairing.lock() = None;
    }

    async fn logout(&self) -> Result<(), ClientError> {
        if self.known_identity().is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        if !self.is_connected() {
            return Err(ClientError::Transport("not connected".to_string()));
        }
        self.clear_credential();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn pairing_events(&self) -> Result<PairingStream, ClientError> {
        if self.known_identity().is_some() {
            return Err(ClientError::AlreadyLoggedIn);
        }
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        let (tx, rx) = mpsc::unbounded();
        *self.pairing.lock() = Some(tx);
        Ok(rx.boxed())
    }

    fn register_event_handler(&self, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::SeqCst));
        self.handlers.write().insert(id, handler);
        id
    }

    fn remove_event_handler(&self, id: HandlerId) -> bool {
        self.handlers.write().remove(&id).is_some()
    }

    fn known_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    fn set_proxy(&self, proxy: Option<&ProxyEndpoint>) -> Result<(), ClientError> {
        *self.proxy.write() = proxy.cloned();
        Ok(())
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds [`MemoryClient`]s bound to a [`MemoryCredentialStore`]
///
/// Keeps every client it hands out so tests can drive them.
pub struct MemoryClientFactory {
    credentials: Arc<MemoryCredentialStore>,
    pairing_code: Option<String>,
    clients: Mutex<Vec<Arc<MemoryClient>>>,
}

impl MemoryClientFactory {
    pub fn new(credentials: Arc<MemoryCredentialStore>) -> Self {
        Self {
            credentials,
            pairing_code: None,
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Issue `code` instead of a random pairing code
    #[must_use]
    pub fn with_pairing_code(mut self, code: impl Into<String>) -> Self {
        self.pairing_code = Some(code.into());
        self
    }

    pub fn credentials(&self) -> &Arc<MemoryCredentialStore> {
        &self.credentials
    }

    pub fn clients(&self) -> Vec<Arc<MemoryClient>> {
        self.clients.lock().clone()
    }

    pub fn last_client(&self) -> Option<Arc<MemoryClient>> {
        self.clients.lock().last().cloned()
    }
}

impl ClientFactory for MemoryClientFactory {
    fn create(&self, slot: CredentialSlot) -> Arc<dyn ProtocolClient> {
        let client = Arc::new(
            MemoryClient::bound(slot, Arc::clone(&self.credentials))
                .with_pairing_code(self.pairing_code.clone()),
        );
        self.clients.lock().push(Arc::clone(&client));
        client
    }
}
