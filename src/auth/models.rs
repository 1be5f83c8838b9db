//! Authentication data models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User database model
///
/// Identity-independent local account; external identities hang off it as
/// `OauthAccount` rows. The id never changes once generated.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Linked external-provider account
///
/// (provider, provider_user_id) is unique; rows are cascade-deleted with
/// their owning user.
#[derive(FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct OauthAccount {
    pub id: String,
    pub user_id: String,
    pub provider: String,
    pub provider_user_id: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: Option<String>,
}
