//! Authentication extractors for Axum
//!
//! Credential extraction (pulling the session cookie off the request) is a
//! separate step from verification, so the token codec and the resolve logic
//! stay testable without an HTTP layer.

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::COOKIE, request::Parts, HeaderMap},
};
use cookie::Cookie;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use super::models::User;
use super::token;
use super::SESSION_COOKIE;
use crate::common::{ApiError, AppState};

/// Authenticated user extractor
///
/// Validates the session cookie and loads the user record; requests without
/// a valid session short-circuit with 401 before the handler runs.
#[derive(Debug)]
pub struct AuthedUser {
    pub user: User,
}

/// Pull the session token out of the Cookie header, if present
pub fn session_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    Cookie::split_parse(raw)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

/// Resolve a request's session cookie to a user record
///
/// Missing cookie, bad signature, malformed subject and deleted user all
/// fail the same way; the response never says which check tripped.
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = match session_token_from_headers(headers) {
        Some(t) => t,
        None => {
            warn!("Authentication failed: no session cookie");
            return Err(ApiError::Unauthorized("authentication required".into()));
        }
    };

    let claims = match token::verify(&token, state.session_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Session token verification failed");
            return Err(ApiError::Unauthorized("invalid session".into()));
        }
    };

    let user_id = match claims.get("sub").and_then(Value::as_str) {
        Some(sub) if !sub.is_empty() => sub.to_string(),
        _ => {
            warn!("Session token carries no usable subject");
            return Err(ApiError::Unauthorized("invalid session".into()));
        }
    };

    let user: Option<User> = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| {
            error!(
                error = %e,
                user_id = %user_id,
                "Database error during user lookup in authentication"
            );
            ApiError::DatabaseError(e)
        })?;

    match user {
        Some(u) => {
            debug!(user_id = %u.id, "Session resolved to user");
            Ok(u)
        }
        None => {
            // token may outlive the account it was minted for
            warn!(user_id = %user_id, "Session subject no longer exists");
            Err(ApiError::Unauthorized("invalid session".into()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Extract the Extension containing the AppState
        let Extension(state_lock): Extension<Arc<RwLock<AppState>>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let app_state = state_lock.read().await.clone();
        let user = resolve_session(&app_state, &parts.headers).await?;

        Ok(AuthedUser { user })
    }
}
