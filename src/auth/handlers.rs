//! Authentication handlers
//!
//! Drives the authorization-code flow per provider: issue a state nonce and
//! redirect out, then on callback validate the state, exchange the code,
//! fetch the profile, upsert the identity and mint the session cookie.
//! Every rejection is terminal; a failed login restarts from the top.

use axum::extract::{Extension, Path, Query};
use axum::http::{header::SET_COOKIE, HeaderValue};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use chrono::Utc;
use cookie::time::Duration as CookieDuration;
use cookie::{Cookie, SameSite};
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::extractors::AuthedUser;
use super::token;
use super::upsert::upsert_oauth_identity;
use super::{SESSION_COOKIE, SESSION_TTL_SECONDS};
use crate::common::{safe_email_log, ApiError, AppState};
use crate::services::Provider;

fn parse_provider(segment: &str) -> Result<Provider, ApiError> {
    Provider::from_str(segment)
        .map_err(|_| ApiError::NotFound("unknown provider".to_string()))
}

fn session_cookie(token: String, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(CookieDuration::seconds(max_age_seconds))
        .build()
}

fn with_cookie(mut response: Response, cookie: Cookie<'static>) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|_| ApiError::InternalServer("session cookie error".to_string()))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

/// GET /auth/{provider}
/// Starts the OAuth flow: issues a state nonce and redirects to the provider
pub async fn oauth_start(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider = parse_provider(&provider)?;
    let state = state_lock.read().await.clone();

    let nonce = state.nonce_store.issue().await;
    let auth_url = state
        .oauth_service
        .authorize_url(provider, &nonce)
        .map_err(|e| {
            warn!(provider = %provider, error = %e, "Cannot start OAuth flow");
            ApiError::ServiceUnavailable("provider not configured".to_string())
        })?;

    info!(provider = %provider, "Starting OAuth flow");
    Ok(Redirect::to(&auth_url))
}

/// GET /auth/{provider}/callback
/// Completes the OAuth flow and sets the session cookie
pub async fn oauth_callback(
    Extension(state_lock): Extension<Arc<RwLock<AppState>>>,
    Path(provider): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let provider = parse_provider(&provider)?;
    let state = state_lock.read().await.clone();

    let (code, nonce) = match (params.get("code"), params.get("state")) {
        (Some(code), Some(nonce)) if !code.is_empty() && !nonce.is_empty() => (code, nonce),
        _ => {
            warn!(provider = %provider, "Callback missing code or state parameter");
            return Err(ApiError::BadRequest("missing code or state".to_string()));
        }
    };

    // expired, reused and forged states all fail identically
    if !state.nonce_store.consume(nonce).await {
        warn!(provider = %provider, "Callback state failed validation");
        return Err(ApiError::BadRequest("invalid state".to_string()));
    }

    let access_token = state
        .oauth_service
        .exchange_code(provider, code)
        .await
        .map_err(|e| {
            warn!(provider = %provider, error = %e, "Token exchange failed");
            ApiError::BadRequest("token exchange failed".to_string())
        })?;

    let profile = state
        .oauth_service
        .fetch_profile(provider, &access_token)
        .await
        .map_err(|e| {
            warn!(provider = %provider, error = %e, "Profile fetch failed");
            ApiError::BadRequest("profile fetch failed".to_string())
        })?;

    let user_id = upsert_oauth_identity(&state.db, provider, &profile, &access_token).await?;

    let exp = Utc::now().timestamp() + SESSION_TTL_SECONDS;
    let session = token::sign(
        &json!({ "sub": user_id, "exp": exp }),
        state.session_secret.as_bytes(),
    )
    .map_err(|e| {
        error!(error = %e, user_id = %user_id, "Session token signing failed");
        ApiError::InternalServer("session error".to_string())
    })?;

    info!(
        user_id = %user_id,
        provider = %provider,
        email = %profile.email.as_deref().map(safe_email_log).unwrap_or_default(),
        "User login successful"
    );

    let response = Redirect::to(&state.post_login_redirect).into_response();
    with_cookie(response, session_cookie(session, SESSION_TTL_SECONDS))
}

/// GET /auth/me
/// Returns the current authenticated user's information
pub async fn me_handler(authed: AuthedUser) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!({ "user": authed.user })))
}

/// POST /auth/logout
/// Clears the session cookie; the token itself simply expires
pub async fn logout_handler() -> Result<Response, ApiError> {
    info!("User logout");
    let response = Json(json!({ "message": "Logout successful" })).into_response();
    with_cookie(response, session_cookie(String::new(), 0))
}
