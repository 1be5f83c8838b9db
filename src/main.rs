// src/main.rs
use axum::{extract::Extension, routing::get, Json, Router};
use dotenv::dotenv;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::collections::HashMap;
use std::env;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod common;
mod services;

use common::AppState;
use services::{MemoryTtlStore, NonceStore, OAuthService, Provider, ProviderConfig};

/// Read per-provider OAuth credentials from the environment
///
/// Providers with missing credentials are skipped with a warning; their
/// routes answer 503 until configured.
fn provider_configs(redirect_base: &str) -> HashMap<Provider, ProviderConfig> {
    let mut providers = HashMap::new();

    let credential_vars = [
        (Provider::Github, "GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET"),
        (Provider::Google, "GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
        (Provider::Discord, "DISCORD_CLIENT_ID", "DISCORD_CLIENT_SECRET"),
    ];

    for (provider, id_var, secret_var) in credential_vars {
        match (env::var(id_var), env::var(secret_var)) {
            (Ok(client_id), Ok(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                providers.insert(
                    provider,
                    ProviderConfig {
                        client_id,
                        client_secret,
                        redirect_uri: format!("{}/auth/{}/callback", redirect_base, provider),
                    },
                );
                info!(provider = %provider, "OAuth provider configured");
            }
            _ => {
                warn!(
                    provider = %provider,
                    "OAuth provider credentials missing, provider disabled"
                );
            }
        }
    }

    providers
}

/// GET /health - liveness probe
async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // ========================================================================
    // ENVIRONMENT CONFIGURATION
    // ========================================================================

    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://wokspec.db".to_string());
    let session_secret = env::var("SESSION_SECRET").unwrap_or_else(|_| {
        warn!("SESSION_SECRET not set, using insecure default");
        "replace_with_strong_secret".to_string()
    });
    let redirect_base =
        env::var("OAUTH_REDIRECT_BASE").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let post_login_redirect = env::var("POST_LOGIN_REDIRECT").unwrap_or_else(|_| "/".to_string());

    // ========================================================================
    // DATABASE SETUP
    // ========================================================================

    let connect_options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(connect_options)
        .await?;

    common::migrations::run_migrations(&pool).await?;

    // ========================================================================
    // SERVICE INITIALIZATION
    // ========================================================================

    let oauth_service = OAuthService::new(provider_configs(&redirect_base));
    info!("OAuthService initialized");

    let ttl_store = Arc::new(MemoryTtlStore::new());
    MemoryTtlStore::start_cleanup_task(ttl_store.clone());
    let nonce_store = NonceStore::new(ttl_store);
    info!("NonceStore initialized, cleanup task started");

    // ========================================================================
    // APPLICATION STATE
    // ========================================================================

    let app_state = AppState {
        db: pool,
        session_secret,
        post_login_redirect,
        oauth_service,
        nonce_store,
    };

    let shared = Arc::new(RwLock::new(app_state));

    // ========================================================================
    // ROUTER COMPOSITION
    // ========================================================================

    let app = Router::new()
        .route("/health", get(health_handler))
        .merge(auth::auth_routes())
        .layer(Extension(shared.clone()))
        .layer({
            let cors_origins = env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());

            let origins: Vec<axum::http::HeaderValue> = cors_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([axum::http::header::CONTENT_TYPE])
                .allow_credentials(true)
        })
        .layer(TraceLayer::new_for_http());

    // ========================================================================
    // SERVER STARTUP
    // ========================================================================

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
