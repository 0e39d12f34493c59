//! Test helpers for integration tests
//!
//! Spawns a gateway on an ephemeral port with in-memory backends and short
//! connection timings, and keeps handles to those backends so tests can play
//! the remote side of a session.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use courier_common::AppConfig;
use courier_core::{SessionId, WebhookTarget};
use courier_db::MemorySessionRepository;
use courier_gateway::client::{MemoryClient, MemoryClientFactory, MemoryCredentialStore};
use courier_gateway::pairing::PairingConfig;
use courier_gateway::server::{create_app, run_server, GatewayState};
use courier_gateway::webhook::RecordingNotifier;
use courier_gateway::{ConnectionPolicy, SessionManager, SessionManagerBuilder};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::fixtures::{PAIRING_CODE, WEBHOOK_URL};

/// Connection timings scaled down so scenarios finish in well under a second
pub fn fast_policy() -> ConnectionPolicy {
    ConnectionPolicy {
        connect_timeout: Duration::from_secs(2),
        max_attempts: 3,
        retry_delay: Duration::from_millis(20),
        reconnect_delay: Duration::from_millis(20),
        auto_reconnect_delay: Duration::from_millis(100),
        auto_reconnect_interval: Duration::from_millis(200),
    }
}

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: GatewayState,
    pub factory: Arc<MemoryClientFactory>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub repository: Arc<MemorySessionRepository>,
    pub notifier: Arc<RecordingNotifier>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Start a server with the default pairing TTL
    pub async fn start() -> Result<Self> {
        Self::start_with(PairingConfig::default()).await
    }

    /// Start a server with custom pairing settings
    pub async fn start_with(pairing: PairingConfig) -> Result<Self> {
        let credentials = Arc::new(MemoryCredentialStore::new());
        Self::start_with_backends(pairing, credentials, Arc::new(MemorySessionRepository::new()))
            .await
    }

    /// Start a server over existing backends, as a restarted process would
    pub async fn start_with_backends(
        pairing: PairingConfig,
        credentials: Arc<MemoryCredentialStore>,
        repository: Arc<MemorySessionRepository>,
    ) -> Result<Self> {
        let factory = Arc::new(
            MemoryClientFactory::new(Arc::clone(&credentials)).with_pairing_code(PAIRING_CODE),
        );
        let notifier = Arc::new(RecordingNotifier::new());

        let sessions = SessionManagerBuilder::new(
            factory.clone(),
            credentials.clone(),
            repository.clone(),
            notifier.clone(),
        )
        .policy(fast_policy())
        .pairing(pairing)
        .default_webhook(WebhookTarget::new(WEBHOOK_URL))
        .build();

        let state = GatewayState::new(sessions, test_config()?);
        let app = create_app(state.clone());

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            run_server(listener, app, server_state).await.ok();
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            client,
            state,
            factory,
            credentials,
            repository,
            notifier,
            handle: Some(handle),
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        self.state.sessions()
    }

    /// Client created for the most recently registered session
    pub fn last_client(&self) -> Result<Arc<MemoryClient>> {
        self.factory
            .last_client()
            .ok_or_else(|| anyhow::anyhow!("no client created yet"))
    }

    /// Create a session over HTTP and return its protocol client
    pub async fn create_session(&self, id: &str) -> Result<Arc<MemoryClient>> {
        let response = self
            .post("/api/v1/sessions", &serde_json::json!({ "id": id }))
            .await?;
        assert_status(response, StatusCode::CREATED).await?;
        self.last_client()
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).json(body).send().await?)
    }

    /// Make a POST request without a body
    pub async fn post_empty(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).send().await?)
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.put(&url).json(body).send().await?)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.delete(&url).send().await?)
    }

    /// Trigger graceful shutdown and wait for the server task
    pub async fn stop(mut self) -> Result<()> {
        self.state.shutdown().cancel();
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        Ok(())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.shutdown().cancel();
    }
}

/// Minimal configuration; the server under test is wired by hand
pub fn test_config() -> Result<AppConfig> {
    AppConfig::from_lookup(|key| match key {
        "GATEWAY_PORT" => Some("0".to_string()),
        _ => None,
    })
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))
}

pub fn session_id(raw: &str) -> SessionId {
    SessionId::parse(raw).expect("valid session id")
}

/// Poll `check` until it returns true or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(
    response: Response,
    expected_status: StatusCode,
) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(response.json().await?)
}

/// Assert response status without parsing body
pub async fn assert_status(response: Response, expected_status: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!(
            "Expected status {}, got {}. Body: {}",
            expected_status,
            status,
            body
        );
    }
    Ok(())
}

/// Assert an error response and return its `error.code`
pub async fn assert_error(response: Response, expected_status: StatusCode) -> Result<String> {
    let body: serde_json::Value = assert_json(response, expected_status).await?;
    body["error"]["code"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("error body without code: {}", body))
}
