//! HTTP API tests
//!
//! Every test starts its own server on an ephemeral port with in-memory
//! backends; no external services are needed.
//!
//! Run with: cargo test -p integration-tests --test api_tests

use integration_tests::{
    assert_error, assert_json, assert_status, fixtures::*, session_id, TestServer,
};
use reqwest::StatusCode;
use serde_json::json;

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server.get("/health").await.unwrap();
    let health: HealthResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
    assert_eq!(health.sessions, 0);

    server.create_session(&unique_session()).await.unwrap();
    let response = server.get("/health").await.unwrap();
    let health: HealthResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(health.sessions, 1);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server
        .client
        .get(format!("{}/health", server.base_url()))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-42");

    let response = server.get("/health").await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

// ============================================================================
// Create / read / delete
// ============================================================================

#[tokio::test]
async fn test_create_session() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();

    let response = server
        .post("/api/v1/sessions", &json!({ "id": id }))
        .await
        .unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::CREATED).await.unwrap();

    assert_eq!(session.id, id);
    assert_eq!(session.status, "disconnected");
    assert!(session.identity.is_none());
    assert!(session.pairing_code.is_none());
    assert!(!session.transport_open);

    let stored = server.repository.get(&session_id(&id)).unwrap();
    assert!(stored.identity.is_none());
}

#[tokio::test]
async fn test_create_session_generates_id() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server.post("/api/v1/sessions", &json!({})).await.unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::CREATED).await.unwrap();
    assert_eq!(session.id.len(), 32);
}

#[tokio::test]
async fn test_create_duplicate_session() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .post("/api/v1/sessions", &json!({ "id": id }))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::CONFLICT).await.unwrap();
    assert_eq!(code, "SESSION_EXISTS");
    assert_eq!(server.sessions().list_sessions().len(), 1);
}

#[tokio::test]
async fn test_create_session_rejects_bad_ids() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server
        .post("/api/v1/sessions", &json!({ "id": "has space" }))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "INVALID_REQUEST_BODY");

    let response = server
        .post("/api/v1/sessions", &json!({ "id": "x".repeat(65) }))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "VALIDATION_ERROR");

    let response = server
        .client
        .post(format!("{}/api/v1/sessions", server.base_url()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "INVALID_REQUEST_BODY");
}

#[tokio::test]
async fn test_get_unknown_session() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server.get("/api/v1/sessions/nobody").await.unwrap();
    let code = assert_error(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(code, "UNKNOWN_SESSION");
}

#[tokio::test]
async fn test_invalid_path_parameter() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server.get("/api/v1/sessions/bad$id").await.unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "INVALID_PATH_PARAMETER");
}

#[tokio::test]
async fn test_list_sessions_sorted() {
    let server = TestServer::start().await.expect("Failed to start server");
    for id in ["charlie", "alpha", "bravo"] {
        server.create_session(id).await.unwrap();
    }

    let response = server.get("/api/v1/sessions").await.unwrap();
    let sessions: Vec<SessionResponse> = assert_json(response, StatusCode::OK).await.unwrap();
    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["alpha", "bravo", "charlie"]);
}

#[tokio::test]
async fn test_delete_session() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .delete(&format!("/api/v1/sessions/{id}"))
        .await
        .unwrap();
    assert_status(response, StatusCode::NO_CONTENT).await.unwrap();

    let response = server.get(&format!("/api/v1/sessions/{id}")).await.unwrap();
    assert_status(response, StatusCode::NOT_FOUND).await.unwrap();
    assert!(server.repository.is_empty());

    let response = server
        .delete(&format!("/api/v1/sessions/{id}"))
        .await
        .unwrap();
    assert_status(response, StatusCode::NOT_FOUND).await.unwrap();
}

// ============================================================================
// Connect / pairing code
// ============================================================================

#[tokio::test]
async fn test_connect_returns_pairing_code() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    let connect: ConnectResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(connect.session_id, id);
    assert_eq!(connect.outcome, "pairing_required");
    assert_eq!(connect.code.as_deref(), Some(PAIRING_CODE));

    let response = server
        .get(&format!("/api/v1/sessions/{id}/pairing-code"))
        .await
        .unwrap();
    let pairing: PairingCodeResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(pairing.session_id, id);
    assert_eq!(pairing.status, "connecting");
    assert_eq!(pairing.code.as_deref(), Some(PAIRING_CODE));
}

#[tokio::test]
async fn test_repeat_connect_returns_same_code() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = server.create_session(&id).await.unwrap();
    let path = format!("/api/v1/sessions/{id}/connect");

    let first: ConnectResponse = assert_json(server.post_empty(&path).await.unwrap(), StatusCode::OK)
        .await
        .unwrap();
    let second: ConnectResponse =
        assert_json(server.post_empty(&path).await.unwrap(), StatusCode::OK)
            .await
            .unwrap();

    assert_eq!(first.code, second.code);
    assert_eq!(client.connect_calls(), 1);
}

#[tokio::test]
async fn test_pairing_code_absent_when_disconnected() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .get(&format!("/api/v1/sessions/{id}/pairing-code"))
        .await
        .unwrap();
    let pairing: PairingCodeResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(pairing.status, "disconnected");
    assert!(pairing.code.is_none());
}

#[tokio::test]
async fn test_connect_unknown_session() {
    let server = TestServer::start().await.expect("Failed to start server");

    let response = server
        .post_empty("/api/v1/sessions/ghost/connect")
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::NOT_FOUND).await.unwrap();
    assert_eq!(code, "UNKNOWN_SESSION");
}

#[tokio::test]
async fn test_connect_failure_is_retryable() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = server.create_session(&id).await.unwrap();
    client.fail_next_connects(10);

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/connect"))
        .await
        .unwrap();
    let body: serde_json::Value = assert_json(response, StatusCode::SERVICE_UNAVAILABLE)
        .await
        .unwrap();
    assert_eq!(body["error"]["code"], "CONNECT_RETRIES_EXHAUSTED");
    assert_eq!(body["error"]["retryable"], true);
    assert_eq!(client.connect_calls(), 3);

    let response = server
        .get(&format!("/api/v1/sessions/{id}/connection"))
        .await
        .unwrap();
    let info: ConnectionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(info.status, "error");
    assert_eq!(info.attempt_count, 3);
    assert!(info.last_error.is_some());
}

#[tokio::test]
async fn test_disconnect_when_not_connected() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/disconnect"))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::CONFLICT).await.unwrap();
    assert_eq!(code, "NOT_CONNECTED");
}

#[tokio::test]
async fn test_logout_requires_pairing() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .post_empty(&format!("/api/v1/sessions/{id}/logout"))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::UNPROCESSABLE_ENTITY)
        .await
        .unwrap();
    assert_eq!(code, "AUTHENTICATION_REQUIRED");
}

#[tokio::test]
async fn test_connection_info_before_first_attempt() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();

    let response = server
        .get(&format!("/api/v1/sessions/{id}/connection"))
        .await
        .unwrap();
    let info: ConnectionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(info.session_id, id);
    assert_eq!(info.status, "disconnected");
    assert_eq!(info.attempt_count, 0);
    assert_eq!(info.retry_count, 0);

    let response = server.get("/api/v1/sessions/ghost/connection").await.unwrap();
    assert_status(response, StatusCode::NOT_FOUND).await.unwrap();
}

// ============================================================================
// Webhook / proxy configuration
// ============================================================================

#[tokio::test]
async fn test_set_webhook() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();
    let path = format!("/api/v1/sessions/{id}/webhook");

    let response = server
        .put(&path, &json!({ "url": "https://hooks.example.com/s1" }))
        .await
        .unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(session.webhook.as_deref(), Some("https://hooks.example.com/s1"));

    let stored = server.repository.get(&session_id(&id)).unwrap();
    assert_eq!(
        stored.webhook.as_ref().map(|w| w.url()),
        Some("https://hooks.example.com/s1")
    );

    let response = server.put(&path, &json!({ "url": null })).await.unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(session.webhook.is_none());
}

#[tokio::test]
async fn test_set_webhook_rejects_bad_urls() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    server.create_session(&id).await.unwrap();
    let path = format!("/api/v1/sessions/{id}/webhook");

    let response = server.put(&path, &json!({ "url": "not a url" })).await.unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "VALIDATION_ERROR");

    let response = server
        .put(&path, &json!({ "url": "ftp://hooks.example.com" }))
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::BAD_REQUEST).await.unwrap();
    assert_eq!(code, "INVALID_REQUEST_BODY");
}

#[tokio::test]
async fn test_set_proxy_reaches_client() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();
    let client = server.create_session(&id).await.unwrap();

    let response = server
        .put(
            &format!("/api/v1/sessions/{id}/proxy"),
            &json!({ "url": "socks5://10.0.0.1:1080", "insecure": true }),
        )
        .await
        .unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    let proxy = session.proxy.unwrap();
    assert_eq!(proxy.url, "socks5://10.0.0.1:1080");
    assert!(proxy.insecure);

    let applied = client.proxy().unwrap();
    assert_eq!(applied.url, "socks5://10.0.0.1:1080");
    assert!(applied.insecure);

    let response = server
        .put(&format!("/api/v1/sessions/{id}/proxy"), &json!({ "url": null }))
        .await
        .unwrap();
    let session: SessionResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert!(session.proxy.is_none());
    assert!(client.proxy().is_none());
}

#[tokio::test]
async fn test_restore_without_credential() {
    let server = TestServer::start().await.expect("Failed to start server");
    let id = unique_session();

    let response = server
        .post(
            &format!("/api/v1/sessions/{id}/restore"),
            &json!({ "identity": unique_identity().as_str() }),
        )
        .await
        .unwrap();
    let code = assert_error(response, StatusCode::UNPROCESSABLE_ENTITY)
        .await
        .unwrap();
    assert_eq!(code, "CONFIGURATION_ERROR");
    assert!(server.sessions().get_session(&session_id(&id)).is_err());
}
