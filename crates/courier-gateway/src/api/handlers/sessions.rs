//! Session handlers

use axum::{extract::State, Json};

use crate::api::dto::{
    ConnectResponse, ConnectionInfoResponse, CreateSessionRequest, PairingCodeResponse,
    RestoreSessionRequest, SetProxyRequest, SetWebhookRequest,
};
use crate::api::extractors::{SessionPath, ValidatedJson};
use crate::api::response::{ApiResult, Created, NoContent};
use crate::connection::ConnectionInfo;
use crate::registry::SessionSnapshot;
use crate::server::GatewayState;

/// Create a session
///
/// POST /sessions
pub async fn create_session(
    State(state): State<GatewayState>,
    ValidatedJson(request): ValidatedJson<CreateSessionRequest>,
) -> ApiResult<Created<Json<SessionSnapshot>>> {
    let id = request.session_id()?;
    let snapshot = state.sessions().create_session(&id).await?;
    Ok(Created(Json(snapshot)))
}

/// GET /sessions
pub async fn list_sessions(State(state): State<GatewayState>) -> Json<Vec<SessionSnapshot>> {
    Json(state.sessions().list_sessions())
}

/// GET /sessions/:id
pub async fn get_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<Json<SessionSnapshot>> {
    Ok(Json(state.sessions().get_session(&id)?))
}

/// DELETE /sessions/:id
pub async fn delete_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<NoContent> {
    state.sessions().remove_session(&id).await?;
    Ok(NoContent)
}

/// Connect a session; unpaired sessions answer with a pairing code
///
/// POST /sessions/:id/connect
pub async fn connect_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<Json<ConnectResponse>> {
    let cancel = state.request_token();
    let outcome = state.sessions().connect_session(&cancel, &id).await?;
    Ok(Json(ConnectResponse {
        session_id: id,
        outcome,
    }))
}

/// POST /sessions/:id/disconnect
pub async fn disconnect_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<Json<SessionSnapshot>> {
    state.sessions().disconnect_session(&id).await?;
    Ok(Json(state.sessions().get_session(&id)?))
}

/// POST /sessions/:id/reconnect
pub async fn reconnect_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<Json<ConnectResponse>> {
    let cancel = state.request_token();
    let outcome = state.sessions().reconnect_session(&cancel, &id).await?;
    Ok(Json(ConnectResponse {
        session_id: id,
        outcome,
    }))
}

/// Re-attach a previously paired identity and connect it
///
/// POST /sessions/:id/restore
pub async fn restore_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
    ValidatedJson(request): ValidatedJson<RestoreSessionRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    let identity = request.identity()?;
    let cancel = state.request_token();
    let outcome = state
        .sessions()
        .restore_session(&cancel, &id, &identity)
        .await?;
    Ok(Json(ConnectResponse {
        session_id: id,
        outcome,
    }))
}

/// POST /sessions/:id/logout
pub async fn logout_session(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<NoContent> {
    state.sessions().logout_session(&id).await?;
    Ok(NoContent)
}

/// GET /sessions/:id/pairing-code
pub async fn get_pairing_code(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<Json<PairingCodeResponse>> {
    let sessions = state.sessions();
    let status = sessions.get_status(&id)?;
    let code = sessions.get_pairing_code(&id)?;
    Ok(Json(PairingCodeResponse {
        session_id: id,
        status,
        code,
    }))
}

/// GET /sessions/:id/connection
pub async fn get_connection_info(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
) -> ApiResult<Json<ConnectionInfoResponse>> {
    let sessions = state.sessions();
    let info = match sessions.connection_info(&id) {
        Some(info) => info,
        // Registered but never attempted
        None => ConnectionInfo {
            status: sessions.get_status(&id)?,
            ..ConnectionInfo::default()
        },
    };
    Ok(Json(ConnectionInfoResponse {
        session_id: id,
        info,
    }))
}

/// PUT /sessions/:id/webhook
pub async fn set_webhook(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
    ValidatedJson(request): ValidatedJson<SetWebhookRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let target = request.target()?;
    Ok(Json(state.sessions().set_webhook(&id, target).await?))
}

/// PUT /sessions/:id/proxy
pub async fn set_proxy(
    State(state): State<GatewayState>,
    SessionPath(id): SessionPath,
    ValidatedJson(request): ValidatedJson<SetProxyRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let endpoint = request.endpoint()?;
    Ok(Json(state.sessions().set_proxy(&id, endpoint).await?))
}
