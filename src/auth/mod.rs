//! # Auth Module
//!
//! This module handles all authentication-related functionality including:
//! - Multi-provider OAuth login (GitHub, Google, Discord)
//! - Signed session token minting and verification
//! - External identity reconciliation into local user records
//! - AuthedUser extractor for protected routes

pub mod extractors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod token;
pub mod upsert;


pub use extractors::AuthedUser;
pub use models::User;
pub use routes::auth_routes;

/// Session cookie name
pub const SESSION_COOKIE: &str = "wokspec_session";

/// Session lifetime: 7 days
pub const SESSION_TTL_SECONDS: i64 = 604_800;
