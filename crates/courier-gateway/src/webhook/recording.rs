//! In-memory webhook notifier

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use courier_core::{DomainResult, WebhookDelivery, WebhookNotifier};

/// Keeps every delivery instead of sending it
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<WebhookDelivery>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.deliveries.lock().clone()
    }

    /// Event names in delivery order
    pub fn events(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .iter()
            .map(|d| d.event.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }
}

#[async_trait]
impl WebhookNotifier for RecordingNotifier {
    async fn notify(&self, delivery: &WebhookDelivery) -> DomainResult<()> {
        debug!(
            session_id = %delivery.session_id,
            event = %delivery.event,
            target = delivery.target.url(),
            "Recorded webhook delivery"
        );
        self.deliveries.lock().push(delivery.clone());
        Ok(())
    }
}
