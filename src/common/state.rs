// Application state shared across all modules

use sqlx::SqlitePool;

use crate::services::{NonceStore, OAuthService};

/// Application state containing database pool, services, and configuration
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub session_secret: String,
    pub post_login_redirect: String,
    pub oauth_service: OAuthService,
    pub nonce_store: NonceStore,
}
