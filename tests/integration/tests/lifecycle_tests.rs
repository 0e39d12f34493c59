//! End-to-end session lifecycle tests
//!
//! Drive sessions through the HTTP API while playing the remote side through
//! the in-memory protocol clients.
//!
//! Run with: cargo test -p integration-tests --test lifecycle_tests

use std::sync::Arc;
use std::time::Duration;

use courier_core::{PresenceSummary, ProtocolClient, ProtocolEvent, SessionStatus};
use courier_db::MemorySessionRepository;
use courier_gateway::client::MemoryClient;
use courier_gateway::pairing::PairingConfig;
use integration_tests::{
    assert_error, assert_json, assert_status, eventually, fixtures::*, session_id, TestServer,
};
use reqwest::StatusCode;
use serde_json::json;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(3);

async fn wait_for_status(server: &TestServer, id: &str, status: SessionStatus) {
    let id = session_id(id);
    eventually(WAIT, || {
        let current = server.sessions().get_status(&id).ok();
        async move { current == Some(status) }
    })
    .await
    .unwrap_or_else(|_| panic!("session {id} never reached {status}"));
}

/// Create, connect and pair a session; returns its client
async fn paired_session(server: &TestServer, id: &str) -> Arc<MemoryClient> {
    let client = server.create_session(id).await.unwrap();
    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();

    client.complete_pairing(unique_identity());
    wait_for_status(server, id, SessionStatus::Connected).await;
    client
}

// ============================================================================
// Pairing
// ============================================================================

#[tokio::test]
async fn test_pair_new_device_end_to_end() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = server.create_session(&id).await.unwrap();

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    let connect: ConnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(connect.code.as_deref(), Some(PAIRING_CODE));

    let identity = unique_identity();
    client.complete_pairing(identity.clone());
    wait_for_status(&server, &id, SessionStatus::Connected).await;

    let response = server.get(&format!("/api/v1/sessions/{id}")).await.unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session.identity.as_deref(), Some(identity.as_str()));
    assert!(session.pairing_code.is_none());
    assert!(session.transport_open);

    let response = server
        .get(&format!("/api/v1/sessions/{id}/pairing-code"))
        .await
        .unwrap();
    let pairing: PairingCodeResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(pairing.code.is_none());

    // Persistence and webhooks run off the event pump
    let sid = session_id(&id);
    eventually(WAIT, || {
        let stored = server.repository.get(&sid);
        let identity = identity.clone();
        async move {
            stored.is_some_and(|r| {
                r.identity.as_ref() == Some(&identity) && r.status == SessionStatus::Connected
            })
        }
    })
    .await
    .unwrap();

    eventually(WAIT, || {
        let events = server.notifier.events();
        async move { events.iter().any(|e| e == "pair_success") }
    })
    .await
    .unwrap();

    let delivery = server
        .notifier
        .deliveries()
        .into_iter()
        .find(|d| d.event == "pair_success")
        .unwrap();
    assert_eq!(delivery.target.url(), WEBHOOK_URL);
    assert_eq!(delivery.session_id, sid);
}

#[tokio::test]
async fn test_pairing_code_expires() {
    let server = TestServer::start_with(PairingConfig {
        code_ttl: Duration::from_millis(150),
        sweep_interval: Duration::from_millis(50),
    })
    .await
    .expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let response = server
        .get(&format!("/api/v1/sessions/{id}/pairing-code"))
        .await
        .unwrap();
    let pairing: PairingCodeResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(pairing.status, "connecting");
    assert!(pairing.code.is_none());

    let response = server.get(&format!("/api/v1/sessions/{id}")).await.unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session.status, "connecting");
    assert!(session.pairing_code.is_none());

    // A new connect starts a fresh pairing cycle.
    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    let connect: ConnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(connect.outcome, "pairing_required");
    assert_eq!(connect.code.as_deref(), Some(PAIRING_CODE));
    assert_eq!(server.last_client().unwrap().connect_calls(), 2);
}

#[tokio::test]
async fn test_remove_session_mid_connect() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = server.create_session(&id).await.unwrap();

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();

    let response = server
        .delete(&format!("/api/v1/sessions/{id}"))
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    // A late pairing success for the removed session goes nowhere
    client.complete_pairing(unique_identity());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = server.get(&format!("/api/v1/sessions/{id}")).await.unwrap();
    assert_status(response, StatusCode::NOT_FOUND).await.unwrap();
    assert!(server.repository.is_empty());
    assert_eq!(client.handler_count(), 0);
    assert!(!server.notifier.events().iter().any(|e| e == "pair_success"));
}

// ============================================================================
// Connection loss / reconnect
// ============================================================================

#[tokio::test]
async fn test_connection_loss_auto_reconnects() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = paired_session(&server, &id).await;
    let calls_before = client.connect_calls();

    client.drop_connection();

    eventually(WAIT, || {
        let calls = client.connect_calls();
        let status = server.sessions().get_status(&session_id(&id)).ok();
        async move { calls > calls_before && status == Some(SessionStatus::Connected) }
    })
    .await
    .unwrap();

    let response = server
        .get(&format!("/api/v1/sessions/{id}/connection"))
        .await
        .unwrap();
    let info: ConnectionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(info.status, "connected");
    assert!(info.retry_count >= 1);
    assert!(server.notifier.events().iter().any(|e| e == "disconnected"));
}

#[tokio::test]
async fn test_explicit_disconnect_is_not_reconnected() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = paired_session(&server, &id).await;

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/disconnect"))
        .await
        .unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session.status, "disconnected");
    assert!(!session.transport_open);

    let calls = client.connect_calls();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.connect_calls(), calls);
    assert_eq!(
        server.sessions().get_status(&session_id(&id)).unwrap(),
        SessionStatus::Disconnected
    );
}

#[tokio::test]
async fn test_reconnect_paired_session() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = paired_session(&server, &id).await;

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/reconnect"))
        .await
        .unwrap();
    let connect: ConnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(connect.outcome, "connected");
    assert!(connect.code.is_none());

    wait_for_status(&server, &id, SessionStatus::Connected).await;
    assert_eq!(client.disconnect_calls(), 1);

    let info = server.sessions().connection_info(&session_id(&id)).unwrap();
    assert_eq!(info.retry_count, 1);
}

#[tokio::test]
async fn test_remote_logout_clears_identity() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = paired_session(&server, &id).await;

    client.remote_logout(Some("device removed".to_string()));
    wait_for_status(&server, &id, SessionStatus::Disconnected).await;

    let session = server.sessions().get_session(&session_id(&id)).unwrap();
    assert!(session.identity.is_none());

    let sid = session_id(&id);
    eventually(WAIT, || {
        let stored = server.repository.get(&sid);
        async move { stored.is_some_and(|r| r.identity.is_none()) }
    })
    .await
    .unwrap();

    // Next connect starts a fresh pairing
    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    let connect: ConnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(connect.outcome, "pairing_required");
}

#[tokio::test]
async fn test_logout_over_http() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    paired_session(&server, &id).await;

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/logout"))
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let response = server.get(&format!("/api/v1/sessions/{id}")).await.unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session.status, "disconnected");
    assert!(session.identity.is_none());
    assert!(server
        .repository
        .get(&session_id(&id))
        .is_some_and(|r| r.identity.is_none()));
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_session_webhook_overrides_default() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = paired_session(&server, &id).await;

    let response = server
        .put(
            &format!("/api/v1/sessions/{id}/webhook"),
            &json!({ "url": "https://hooks.example.com/own" }),
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();
    server.notifier.clear();

    client.emit(ProtocolEvent::Presence(PresenceSummary {
        from: unique_identity().to_string(),
        available: true,
        last_seen: None,
    }));

    eventually(WAIT, || {
        let deliveries = server.notifier.deliveries();
        async move { !deliveries.is_empty() }
    })
    .await
    .unwrap();

    let delivery = &server.notifier.deliveries()[0];
    assert_eq!(delivery.event, "presence");
    assert_eq!(delivery.target.url(), "https://hooks.example.com/own");
}

// ============================================================================
// Restore / shutdown
// ============================================================================

#[tokio::test]
async fn test_restart_restores_paired_sessions() {
    let first = TestServer::start().await.expect("Failed to start server");
    let paired = unique_session();
    let unpaired = unique_session();
    paired_session(&first, &paired).await;
    first.create_session(&unpaired).await.unwrap();

    let sid = session_id(&paired);
    eventually(WAIT, || {
        let stored = first.repository.get(&sid);
        async move { stored.is_some_and(|r| r.identity.is_some()) }
    })
    .await
    .unwrap();

    let credentials = Arc::clone(&first.credentials);
    let repository = Arc::clone(&first.repository);
    first.stop().await.unwrap();
    assert_eq!(
        repository.get(&sid).map(|r| r.status),
        Some(SessionStatus::Disconnected)
    );

    let second =
        TestServer::start_with_backends(PairingConfig::default(), credentials, repository)
            .await
            .expect("Failed to start server");
    let report = second
        .sessions()
        .restore_all(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.restored, vec![sid.clone()]);
    assert!(report.failed.is_empty());
    wait_for_status(&second, &paired, SessionStatus::Connected).await;

    // Unpaired sessions are not restored
    let response = second
        .get(&format!("/api/v1/sessions/{unpaired}"))
        .await
        .unwrap();
    assert_status(response, StatusCode::NOT_FOUND).await.unwrap();
}

#[tokio::test]
async fn test_restore_over_http() {
    let first = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    paired_session(&first, &id).await;
    let identity = first
        .sessions()
        .get_session(&session_id(&id))
        .unwrap()
        .identity
        .unwrap();

    let credentials = Arc::clone(&first.credentials);
    first.stop().await.unwrap();

    // Fresh repository: the identity comes in with the request
    let second = TestServer::start_with_backends(
        PairingConfig::default(),
        credentials,
        Arc::new(MemorySessionRepository::new()),
    )
    .await
    .expect("Failed to start server");

    let response = second
        .post(
            &format!("/api/v1/sessions/{id}/restore"),
            &json!({ "identity": identity.as_str() }),
        )
        .await
        .unwrap();
    let connect: ConnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(connect.outcome, "connected");
    wait_for_status(&second, &id, SessionStatus::Connected).await;

    let response = second
        .post(
            &format!("/api/v1/sessions/{id}/restore"),
            &json!({ "identity": identity.as_str() }),
        )
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::CONFLICT).await.unwrap();
    assert_eq!(code, "SESSION_EXISTS");
}

#[tokio::test]
async fn test_shutdown_disconnects_sessions() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = paired_session(&server, &id).await;
    let repository = Arc::clone(&server.repository);

    server.stop().await.unwrap();

    assert!(!client.is_connected());
    assert_eq!(
        repository.get(&session_id(&id)).map(|r| r.status),
        Some(SessionStatus::Disconnected)
    );
}
