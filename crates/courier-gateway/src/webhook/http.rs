//! HTTP webhook notifier

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use courier_common::WebhookConfig;
use courier_core::{DomainError, DomainResult, WebhookDelivery, WebhookNotifier};

/// Header carrying the session id of a delivery
pub const SESSION_HEADER: &str = "X-Courier-Session";
/// Header carrying the event name of a delivery
pub const EVENT_HEADER: &str = "X-Courier-Event";

const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Posts webhook deliveries as JSON
///
/// A delivery is attempted up to `max_attempts` times, waiting
/// `attempt * 500ms` between attempts. Client errors (4xx) are not retried.
#[derive(Debug, Clone)]
pub struct HttpWebhookNotifier {
    client: Client,
    max_attempts: u32,
}

impl HttpWebhookNotifier {
    pub fn new(config: &WebhookConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("courier-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build webhook HTTP client: {e}"))?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
        })
    }

    async fn post(&self, delivery: &WebhookDelivery) -> Result<(), Attempt> {
        let response = self
            .client
            .post(delivery.target.url())
            .header(SESSION_HEADER, delivery.session_id.as_str())
            .header(EVENT_HEADER, &delivery.event)
            .json(delivery)
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(Attempt::Fatal(format!("webhook rejected delivery: {status}")))
        } else {
            Err(Attempt::Retry(format!("webhook responded with {status}")))
        }
    }
}

enum Attempt {
    Retry(String),
    Fatal(String),
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    #[instrument(
        skip(self, delivery),
        fields(session_id = %delivery.session_id, event = %delivery.event)
    )]
    async fn notify(&self, delivery: &WebhookDelivery) -> DomainResult<()> {
        let mut attempt = 1;
        loop {
            match self.post(delivery).await {
                Ok(()) => {
                    debug!(attempt, "Webhook delivered");
                    return Ok(());
                }
                Err(Attempt::Fatal(msg)) => return Err(DomainError::WebhookError(msg)),
                Err(Attempt::Retry(msg)) if attempt >= self.max_attempts => {
                    return Err(DomainError::WebhookError(format!(
                        "giving up after {attempt} attempts: {msg}"
                    )));
                }
                Err(Attempt::Retry(msg)) => {
                    warn!(attempt, error = %msg, "Webhook delivery failed; retrying");
                    tokio::time::sleep(BACKOFF_STEP * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}
