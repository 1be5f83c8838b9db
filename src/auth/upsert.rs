//! Identity upsert engine
//!
//! Reconciles an external-provider identity into a local user plus linked
//! account record. Keyed by (provider, provider_user_id); repeated logins by
//! the same external identity never create duplicates. Identities from
//! different providers are never merged, even when they report the same
//! email.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::common::{generate_account_id, generate_user_id, safe_email_log, ApiError};
use crate::services::{Provider, ProviderProfile};

/// Insert-or-update the local records for an external identity
///
/// Returns the owning user id. Profile updates use coalesce semantics: an
/// incoming non-null field overwrites, an incoming null never clears a
/// stored value. Both writes of either branch commit as one transaction.
pub async fn upsert_oauth_identity(
    pool: &SqlitePool,
    provider: Provider,
    profile: &ProviderProfile,
    access_token: &str,
) -> Result<String, ApiError> {
    let mut tx = pool.begin().await?;

    let existing: Option<(String, String)> = sqlx::query_as(
        "SELECT id, user_id FROM oauth_accounts WHERE provider = ? AND provider_user_id = ?",
    )
    .bind(provider.as_str())
    .bind(&profile.provider_user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let user_id = match existing {
        Some((account_id, user_id)) => {
            debug!(
                provider = %provider,
                provider_user_id = %profile.provider_user_id,
                user_id = %user_id,
                "Found existing linked account, refreshing token and profile"
            );

            sqlx::query("UPDATE oauth_accounts SET access_token = ? WHERE id = ?")
                .bind(access_token)
                .bind(&account_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                UPDATE users SET
                    email = COALESCE(?, email),
                    display_name = COALESCE(?, display_name),
                    avatar_url = COALESCE(?, avatar_url),
                    updated_at = datetime('now')
                WHERE id = ?
                "#,
            )
            .bind(profile.email.as_deref())
            .bind(profile.display_name.as_deref())
            .bind(profile.avatar_url.as_deref())
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;

            user_id
        }
        None => {
            let user_id = generate_user_id();
            info!(
                user_id = %user_id,
                provider = %provider,
                email = %profile.email.as_deref().map(safe_email_log).unwrap_or_default(),
                "Creating new user for external identity"
            );

            sqlx::query(
                r#"
                INSERT INTO users (id, email, username, display_name, avatar_url)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user_id)
            .bind(profile.email.as_deref())
            .bind(profile.username.as_deref())
            .bind(profile.display_name.as_deref())
            .bind(profile.avatar_url.as_deref())
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO oauth_accounts (id, user_id, provider, provider_user_id, access_token)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(generate_account_id())
            .bind(&user_id)
            .bind(provider.as_str())
            .bind(&profile.provider_user_id)
            .bind(access_token)
            .execute(&mut *tx)
            .await?;

            user_id
        }
    };

    tx.commit().await?;
    Ok(user_id)
}
