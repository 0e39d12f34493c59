//! Event subscription handle

use tokio_util::sync::CancellationToken;
use tracing::debug;

use courier_core::{HandlerId, ProtocolClient};

/// Registration of the gateway's callback on one client
///
/// Closing it unregisters the callback and stops the session's pump.
#[derive(Debug)]
pub struct EventSubscription {
    handler: HandlerId,
    pump: CancellationToken,
}

impl EventSubscription {
    pub(crate) fn new(handler: HandlerId, pump: CancellationToken) -> Self {
        Self { handler, pump }
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler
    }

    /// Unregister from `client` and stop the pump
    pub fn close(self, client: &dyn ProtocolClient) {
        if !client.remove_event_handler(self.handler) {
            debug!(handler = %self.handler, "Event handler was already removed");
        }
        self.pump.cancel();
    }
}
