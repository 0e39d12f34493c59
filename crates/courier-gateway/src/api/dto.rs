//! Request and response bodies

use serde::{Deserialize, Serialize};
use validator::Validate;

use courier_core::{
    Identity, ProxyEndpoint, SessionId, SessionStatus, WebhookTarget,
};

use crate::connection::{ConnectOutcome, ConnectionInfo};

use super::response::ApiError;

// ============================================================================
// Requests
// ============================================================================

/// POST /api/v1/sessions
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    /// Caller-chosen session id; generated when omitted
    #[validate(length(min = 1, max = 64))]
    pub id: Option<String>,
}

impl CreateSessionRequest {
    pub fn session_id(&self) -> Result<SessionId, ApiError> {
        let raw = self
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        SessionId::parse(raw).map_err(|e| ApiError::invalid_body(e.to_string()))
    }
}

/// POST /api/v1/sessions/:id/restore
#[derive(Debug, Deserialize, Validate)]
pub struct RestoreSessionRequest {
    #[validate(length(min = 3, max = 128))]
    pub identity: String,
}

impl RestoreSessionRequest {
    pub fn identity(&self) -> Result<Identity, ApiError> {
        Identity::parse(self.identity.clone()).map_err(|e| ApiError::invalid_body(e.to_string()))
    }
}

/// PUT /api/v1/sessions/:id/webhook
#[derive(Debug, Deserialize, Validate)]
pub struct SetWebhookRequest {
    /// `null` falls back to the gateway default target
    #[validate(url)]
    pub url: Option<String>,
}

impl SetWebhookRequest {
    pub fn target(&self) -> Result<Option<WebhookTarget>, ApiError> {
        self.url
            .as_deref()
            .map(|url| {
                WebhookTarget::new(url)
                    .ok_or_else(|| ApiError::invalid_body("webhook url must use http or https"))
            })
            .transpose()
    }
}

/// PUT /api/v1/sessions/:id/proxy
#[derive(Debug, Deserialize, Validate)]
pub struct SetProxyRequest {
    /// `null` removes the proxy
    #[validate(url)]
    pub url: Option<String>,
    #[serde(default)]
    pub insecure: bool,
}

impl SetProxyRequest {
    pub fn endpoint(&self) -> Result<Option<ProxyEndpoint>, ApiError> {
        self.url
            .as_deref()
            .map(|url| {
                ProxyEndpoint::new(url)
                    .map(|endpoint| ProxyEndpoint {
                        insecure: self.insecure,
                        ..endpoint
                    })
                    .ok_or_else(|| {
                        ApiError::invalid_body("proxy url must use http, https or socks5")
                    })
            })
            .transpose()
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub outcome: ConnectOutcome,
}

#[derive(Debug, Serialize)]
pub struct PairingCodeResponse {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionInfoResponse {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub info: ConnectionInfo,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_session_id_is_valid() {
        let request = CreateSessionRequest { id: None };
        let id = request.session_id().unwrap();
        assert_eq!(id.as_str().len(), 32);
    }

    #[test]
    fn test_session_id_charset_is_enforced() {
        let request = CreateSessionRequest {
            id: Some("has space".to_string()),
        };
        assert!(request.validate().is_ok());
        assert!(request.session_id().is_err());
    }

    #[test]
    fn test_proxy_scheme_and_flag() {
        let request = SetProxyRequest {
            url: Some("socks5://10.0.0.1:1080".to_string()),
            insecure: true,
        };
        assert!(request.validate().is_ok());
        let endpoint = request.endpoint().unwrap().unwrap();
        assert!(endpoint.insecure);

        let request = SetProxyRequest {
            url: Some("ftp://10.0.0.1".to_string()),
            insecure: false,
        };
        assert!(request.endpoint().is_err());
    }

    #[test]
    fn test_webhook_url_validation() {
        let request = SetWebhookRequest {
            url: Some("not a url".to_string()),
        };
        assert!(request.validate().is_err());

        let request = SetWebhookRequest { url: None };
        assert!(request.target().unwrap().is_none());
    }

    #[test]
    fn test_connect_response_flattens_outcome() {
        let body = serde_json::to_value(ConnectResponse {
            session_id: SessionId::parse("s1").unwrap(),
            outcome: ConnectOutcome::PairingRequired {
                code: "ABC123".to_string(),
            },
        })
        .unwrap();
        assert_eq!(body["session_id"], "s1");
        assert_eq!(body["outcome"], "pairing_required");
        assert_eq!(body["code"], "ABC123");
    }
}
