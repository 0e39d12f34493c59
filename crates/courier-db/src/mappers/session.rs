//! Session record <-> model mapper

use courier_core::entities::{SessionRecord, SessionStatus};
use courier_core::error::DomainError;
use courier_core::value_objects::{Identity, ProxyEndpoint, SessionId, WebhookTarget};

use crate::models::SessionModel;

/// Rows are validated on the way out; a malformed row is a database error,
/// not a panic.
impl TryFrom<SessionModel> for SessionRecord {
    type Error = DomainError;

    fn try_from(model: SessionModel) -> Result<Self, Self::Error> {
        let corrupt = |field: &str, value: &str| {
            DomainError::DatabaseError(format!(
                "session {}: invalid {field} '{value}'",
                model.id
            ))
        };

        let id = SessionId::parse(model.id.clone()).map_err(|_| corrupt("id", &model.id))?;

        let identity = model
            .identity
            .as_deref()
            .map(|raw| Identity::parse(raw).map_err(|_| corrupt("identity", raw)))
            .transpose()?;

        let status =
            SessionStatus::from_str(&model.status).ok_or_else(|| corrupt("status", &model.status))?;

        let proxy = model
            .proxy_url
            .as_deref()
            .map(|url| {
                ProxyEndpoint::new(url)
                    .map(|proxy| ProxyEndpoint {
                        insecure: model.proxy_insecure,
                        ..proxy
                    })
                    .ok_or_else(|| corrupt("proxy_url", url))
            })
            .transpose()?;

        let webhook = model
            .webhook_url
            .as_deref()
            .map(|url| WebhookTarget::new(url).ok_or_else(|| corrupt("webhook_url", url)))
            .transpose()?;

        Ok(SessionRecord {
            id,
            identity,
            status,
            proxy,
            webhook,
            last_seen: model.last_seen,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

/// Borrowed column values for inserting a session row
pub struct SessionInsert<'a> {
    pub id: &'a str,
    pub identity: Option<&'a str>,
    pub status: &'static str,
    pub proxy_url: Option<&'a str>,
    pub proxy_insecure: bool,
    pub webhook_url: Option<&'a str>,
}

impl<'a> SessionInsert<'a> {
    pub fn new(record: &'a SessionRecord) -> Self {
        Self {
            id: record.id.as_str(),
            identity: record.identity.as_ref().map(Identity::as_str),
            status: record.status.as_str(),
            proxy_url: record.proxy.as_ref().map(|p| p.url.as_str()),
            proxy_insecure: record.proxy.as_ref().is_some_and(|p| p.insecure),
            webhook_url: record.webhook.as_ref().map(WebhookTarget::url),
        }
    }
}
