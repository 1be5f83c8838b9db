//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `GET /auth/:provider` - Start the OAuth flow (redirects to the provider)
/// - `GET /auth/:provider/callback` - Complete the flow, set session cookie
/// - `GET /auth/me` - Get current user information
/// - `POST /auth/logout` - Clear the session cookie
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth/me", get(handlers::me_handler))
        .route("/auth/logout", post(handlers::logout_handler))
        .route("/auth/:provider", get(handlers::oauth_start))
        .route("/auth/:provider/callback", get(handlers::oauth_callback))
}
