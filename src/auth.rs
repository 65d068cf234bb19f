//! Session-derived caller identity.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap};

use crate::api::response::ApiError;
use crate::AppState;

/// Cookie carrying the session token for browser callers.
pub const SESSION_COOKIE: &str = "session_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

/// Resolves session tokens issued by the identity provider to user identities.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: HashMap<String, String>,
}

impl SessionStore {
    pub fn new(sessions: HashMap<String, String>) -> Self {
        Self { sessions }
    }

    pub fn resolve(&self, token: &str) -> Option<Identity> {
        self.sessions.get(token).map(|user_id| Identity {
            user_id: user_id.clone(),
        })
    }
}

/// Extract a session token from `Authorization: Bearer` or the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|t| !t.is_empty())
}

/// The authenticated caller of a request. Rejects with 401 when no session resolves.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, ApiError> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

        state
            .sessions
            .resolve(token)
            .map(Caller)
            .ok_or_else(|| ApiError::unauthorized("Session is invalid or expired"))
    }
}
