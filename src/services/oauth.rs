// src/services/oauth.rs
//! OAuth provider adapters
//!
//! One adapter surface, three variants (GitHub, Google, Discord). Each
//! variant implements the same three capabilities - build-authorize-url,
//! exchange-code, fetch-profile - so the callback flow is written once.
//! The provider table is immutable configuration built at startup.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::common::safe_token_log;

/// Bound on outbound provider calls; a timeout is a terminal rejection
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream error detail kept in logs, truncated to avoid dumping bodies
const ERROR_DETAIL_LIMIT: usize = 120;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("provider {0} is not configured")]
    NotConfigured(Provider),

    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("profile fetch failed: {0}")]
    ProfileFailed(String),

    #[error("provider request failed: {0}")]
    RequestFailed(String),
}

/// Fixed set of supported identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Github,
    Google,
    Discord,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Google => "google",
            Provider::Discord => "discord",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Provider::Github),
            "google" => Ok(Provider::Google),
            "discord" => Ok(Provider::Discord),
            _ => Err(()),
        }
    }
}

/// Per-provider OAuth application credentials
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// External identity normalized into the canonical profile shape
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    id: String,
    username: Option<String>,
    global_name: Option<String>,
    email: Option<String>,
    avatar: Option<String>,
}

#[derive(Clone)]
pub struct OAuthService {
    client: Client,
    providers: HashMap<Provider, ProviderConfig>,
}

impl OAuthService {
    pub fn new(providers: HashMap<Provider, ProviderConfig>) -> Self {
        let client = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, providers }
    }

    fn config(&self, provider: Provider) -> Result<&ProviderConfig, OAuthError> {
        self.providers
            .get(&provider)
            .ok_or(OAuthError::NotConfigured(provider))
    }

    /// Build the provider's authorization URL with the anti-forgery state
    pub fn authorize_url(&self, provider: Provider, state: &str) -> Result<String, OAuthError> {
        let config = self.config(provider)?;

        let url = match provider {
            Provider::Github => format!(
                "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&scope={}&state={}",
                urlencoding::encode(&config.client_id),
                urlencoding::encode(&config.redirect_uri),
                urlencoding::encode("read:user user:email"),
                urlencoding::encode(state),
            ),
            Provider::Google => format!(
                "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
                urlencoding::encode(&config.client_id),
                urlencoding::encode(&config.redirect_uri),
                urlencoding::encode("openid email profile"),
                urlencoding::encode(state),
            ),
            Provider::Discord => format!(
                "https://discord.com/oauth2/authorize?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
                urlencoding::encode(&config.client_id),
                urlencoding::encode(&config.redirect_uri),
                urlencoding::encode("identify email"),
                urlencoding::encode(state),
            ),
        };

        debug!(provider = %provider, "Built authorization URL");
        Ok(url)
    }

    /// Exchange an authorization code for an access token
    ///
    /// GitHub takes a JSON body; Google and Discord take form-encoded bodies.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
    ) -> Result<String, OAuthError> {
        let config = self.config(provider)?;

        let response = match provider {
            Provider::Github => {
                let body = serde_json::json!({
                    "client_id": config.client_id,
                    "client_secret": config.client_secret,
                    "code": code,
                    "redirect_uri": config.redirect_uri,
                });
                self.client
                    .post("https://github.com/login/oauth/access_token")
                    .header(reqwest::header::ACCEPT, "application/json")
                    .json(&body)
                    .send()
                    .await
            }
            Provider::Google => {
                let params = [
                    ("code", code),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.as_str()),
                    ("redirect_uri", config.redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ];
                self.client
                    .post("https://oauth2.googleapis.com/token")
                    .form(&params)
                    .send()
                    .await
            }
            Provider::Discord => {
                let params = [
                    ("code", code),
                    ("client_id", config.client_id.as_str()),
                    ("client_secret", config.client_secret.as_str()),
                    ("redirect_uri", config.redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ];
                self.client
                    .post("https://discord.com/api/oauth2/token")
                    .form(&params)
                    .send()
                    .await
            }
        };

        let response = response.map_err(|e| OAuthError::RequestFailed(truncate_detail(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                provider = %provider,
                http_status = %status,
                detail = %truncate_detail(&body),
                "Token exchange returned error status"
            );
            return Err(OAuthError::ExchangeFailed(format!("HTTP {}", status)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(truncate_detail(&e.to_string())))?;

        match token.access_token {
            Some(access_token) => {
                debug!(
                    provider = %provider,
                    access_token = %safe_token_log(&access_token),
                    "Exchanged authorization code for access token"
                );
                Ok(access_token)
            }
            None => Err(OAuthError::ExchangeFailed(
                "no access token in response".to_string(),
            )),
        }
    }

    /// Fetch the external profile and normalize provider-specific fields
    pub async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        match provider {
            Provider::Github => self.fetch_github_profile(access_token).await,
            Provider::Google => self.fetch_google_profile(access_token).await,
            Provider::Discord => self.fetch_discord_profile(access_token).await,
        }
    }

    async fn fetch_github_profile(
        &self,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let user: GithubUser = self
            .get_json("https://api.github.com/user", access_token)
            .await?;

        // the primary profile often omits the email; ask the emails endpoint
        // for the verified primary address instead
        let email = match user.email {
            Some(email) => Some(email),
            None => self.fetch_github_primary_email(access_token).await,
        };

        Ok(ProviderProfile {
            provider_user_id: user.id.to_string(),
            email,
            username: Some(user.login),
            display_name: user.name,
            avatar_url: user.avatar_url,
        })
    }

    async fn fetch_github_primary_email(&self, access_token: &str) -> Option<String> {
        let emails: Vec<GithubEmail> = match self
            .get_json("https://api.github.com/user/emails", access_token)
            .await
        {
            Ok(emails) => emails,
            Err(e) => {
                warn!(error = %e, "GitHub email fallback lookup failed");
                return None;
            }
        };

        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
    }

    async fn fetch_google_profile(
        &self,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let user: GoogleUser = self
            .get_json("https://www.googleapis.com/oauth2/v2/userinfo", access_token)
            .await?;

        Ok(ProviderProfile {
            provider_user_id: user.id,
            email: user.email,
            username: None,
            display_name: user.name,
            avatar_url: user.picture,
        })
    }

    async fn fetch_discord_profile(
        &self,
        access_token: &str,
    ) -> Result<ProviderProfile, OAuthError> {
        let user: DiscordUser = self
            .get_json("https://discord.com/api/users/@me", access_token)
            .await?;

        // Discord reports an avatar hash; the image lives on their CDN
        let avatar_url = user
            .avatar
            .as_ref()
            .map(|hash| format!("https://cdn.discordapp.com/avatars/{}/{}.png", user.id, hash));

        Ok(ProviderProfile {
            provider_user_id: user.id,
            email: user.email,
            display_name: user.global_name,
            username: user.username,
            avatar_url,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, OAuthError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            // GitHub rejects requests without a user agent
            .header(reqwest::header::USER_AGENT, "wokspec-api")
            .send()
            .await
            .map_err(|e| OAuthError::RequestFailed(truncate_detail(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                url = %url,
                http_status = %status,
                detail = %truncate_detail(&body),
                "Profile fetch returned error status"
            );
            return Err(OAuthError::ProfileFailed(format!("HTTP {}", status)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OAuthError::ProfileFailed(truncate_detail(&e.to_string())))
    }
}

fn truncate_detail(detail: &str) -> String {
    if detail.len() > ERROR_DETAIL_LIMIT {
        let cut = detail
            .char_indices()
            .take_while(|(i, _)| *i < ERROR_DETAIL_LIMIT)
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);
        format!("{}...", &detail[..cut])
    } else {
        detail.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with(provider: Provider) -> OAuthService {
        let mut providers = HashMap::new();
        providers.insert(
            provider,
            ProviderConfig {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: format!("http://localhost:8080/auth/{}/callback", provider),
            },
        );
        OAuthService::new(providers)
    }

    #[test]
    fn test_provider_parse_round_trip() {
        for provider in [Provider::Github, Provider::Google, Provider::Discord] {
            assert_eq!(provider.as_str().parse::<Provider>(), Ok(provider));
        }
        assert!("facebook".parse::<Provider>().is_err());
    }

    #[test]
    fn test_authorize_url_carries_state_and_redirect() {
        let service = service_with(Provider::Github);
        let url = service
            .authorize_url(Provider::Github, "abc123")
            .expect("url");

        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains(&urlencoding::encode(
            "http://localhost:8080/auth/github/callback"
        ).into_owned()));
    }

    #[test]
    fn test_google_authorize_url_requests_code() {
        let service = service_with(Provider::Google);
        let url = service
            .authorize_url(Provider::Google, "xyz")
            .expect("url");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(&urlencoding::encode("openid email profile").into_owned()));
    }

    #[test]
    fn test_unconfigured_provider_is_rejected() {
        let service = service_with(Provider::Github);
        let result = service.authorize_url(Provider::Discord, "abc");
        assert!(matches!(result, Err(OAuthError::NotConfigured(_))));
    }

    #[test]
    fn test_truncate_detail_bounds_long_bodies() {
        let long = "x".repeat(500);
        let truncated = truncate_detail(&long);
        assert!(truncated.len() <= ERROR_DETAIL_LIMIT + 3);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_detail("short"), "short");
    }
}
