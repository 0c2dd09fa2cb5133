//! Bearer token authentication.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Query};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::warn;

use crate::AppState;
use crate::error::ApiError;

/// Query parameters for clients that cannot set headers (e.g. `EventSource`).
#[derive(Deserialize, Default)]
struct TokenQuery {
    token: Option<String>,
}

/// Proof that the request carried the configured token. Always granted when
/// no token is configured.
pub struct Authorized;

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected_token) = state.auth_token.as_deref() else {
            return Ok(Authorized);
        };

        let query_token = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(query)| query.token);
        let provided_token = extract_bearer_token(&parts.headers).or(query_token.as_deref());

        match provided_token {
            Some(token) if token == expected_token => Ok(Authorized),
            _ => {
                warn!(path = %parts.uri.path(), "Authentication failed");
                Err(ApiError::Unauthorized)
            }
        }
    }
}

/// Extract bearer token from Authorization header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
