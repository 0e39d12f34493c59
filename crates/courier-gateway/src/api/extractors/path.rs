//! Path parameter extractors

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

use courier_core::SessionId;

use crate::api::response::ApiError;

/// The `:id` segment of a session route, parsed as a [`SessionId`]
#[derive(Debug, Clone)]
pub struct SessionPath(pub SessionId);

#[async_trait]
impl<S> FromRequestParts<S> for SessionPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_path(e.to_string()))?;

        SessionId::parse(raw)
            .map(SessionPath)
            .map_err(|e| ApiError::invalid_path(e.to_string()))
    }
}
