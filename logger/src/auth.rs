//! Authorization-code OAuth against the Spotify accounts service.
//!
//! Tokens are cached on disk in the same JSON layout spotipy writes, so an
//! existing `.cache-*` file from the old scripts keeps working.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{Config, SCOPE};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Tokens this close to expiry are refreshed up front.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: i64,
    scope: Option<String>,
    refresh_token: Option<String>,
}

impl TokenCache {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| {
            format!(
                "no token cache at {}; run `spotlog authorize` first",
                path.display()
            )
        })?;
        serde_json::from_str(&raw)
            .with_context(|| format!("token cache {} is not valid JSON", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string(self)?;
        std::fs::write(path, raw)
            .with_context(|| format!("failed to write token cache {}", path.display()))
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at - now < EXPIRY_MARGIN_SECS
    }

    fn from_response(response: TokenResponse, now: i64, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            scope: response.scope,
            expires_at: now + response.expires_in,
            // Spotify may omit the refresh token on refresh; the old one stays valid.
            refresh_token: response.refresh_token.or(previous_refresh),
        }
    }
}

/// URL the user opens in a browser to grant access.
pub fn authorize_url(config: &Config) -> Result<Url> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("scope", SCOPE),
        ],
    )
    .context("failed to build authorize URL")
}

/// Pull the `code` out of the URL the browser was redirected to.
pub fn code_from_redirect(redirect: &str) -> Result<String> {
    let url = Url::parse(redirect.trim()).context("redirect URL is not a valid URL")?;

    if let Some((_, error)) = url.query_pairs().find(|(k, _)| k == "error") {
        bail!("authorization was denied: {}", error);
    }

    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| anyhow!("redirect URL has no `code` parameter"))
}

pub async fn exchange_code(client: &Client, config: &Config, code: &str) -> Result<TokenCache> {
    let response = request_token(
        client,
        config,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ],
    )
    .await?;

    Ok(TokenCache::from_response(response, Utc::now().timestamp(), None))
}

pub async fn refresh(client: &Client, config: &Config, refresh_token: &str) -> Result<TokenCache> {
    let response = request_token(
        client,
        config,
        &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
    )
    .await?;

    Ok(TokenCache::from_response(
        response,
        Utc::now().timestamp(),
        Some(refresh_token.to_string()),
    ))
}

async fn request_token(
    client: &Client,
    config: &Config,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let auth = format!("{}:{}", config.client_id, config.client_secret);
    let encoded =
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, auth.as_bytes());

    let response = client
        .post(TOKEN_URL)
        .header("Authorization", format!("Basic {}", encoded))
        .form(form)
        .send()
        .await
        .context("token request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("token endpoint returned {}: {}", status, body);
    }

    response
        .json()
        .await
        .context("token endpoint returned an unexpected body")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> Config {
        Config {
            client_id: "abc".to_string(),
            client_secret: "shh".to_string(),
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            db_path: PathBuf::from("spotify.db"),
            token_cache: PathBuf::from(".cache-test"),
        }
    }

    #[test]
    fn test_authorize_url_carries_scope_and_redirect() {
        let url = authorize_url(&config()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("client_id".into(), "abc".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://127.0.0.1:8888/callback".into()
        )));
        assert!(pairs.contains(&("scope".into(), SCOPE.into())));
    }

    #[test]
    fn test_code_from_redirect() {
        let code = code_from_redirect("http://127.0.0.1:8888/callback?code=AQD42&state=x\n").unwrap();
        assert_eq!(code, "AQD42");

        assert!(code_from_redirect("http://127.0.0.1:8888/callback?state=x").is_err());

        let denied = code_from_redirect("http://127.0.0.1:8888/callback?error=access_denied")
            .unwrap_err()
            .to_string();
        assert!(denied.contains("access_denied"));
    }

    #[test]
    fn test_reads_spotipy_cache_layout() {
        let raw = r#"{"access_token": "BQC", "token_type": "Bearer", "expires_in": 3600,
            "scope": "user-read-recently-played", "expires_at": 1700000000,
            "refresh_token": "AQB"}"#;
        let cache: TokenCache = serde_json::from_str(raw).unwrap();
        assert_eq!(cache.refresh_token.as_deref(), Some("AQB"));
        assert!(!cache.is_expired(1_699_990_000));
        assert!(cache.is_expired(1_699_999_950));
    }

    #[test]
    fn test_refresh_keeps_old_refresh_token() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: None,
            refresh_token: None,
        };
        let cache = TokenCache::from_response(response, 1_000, Some("old-refresh".to_string()));
        assert_eq!(cache.expires_at, 4_600);
        assert_eq!(cache.refresh_token.as_deref(), Some("old-refresh"));
    }

    #[test]
    fn test_cache_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cache-test");
        let cache = TokenCache {
            access_token: "a".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3600,
            scope: Some(SCOPE.to_string()),
            expires_at: 42,
            refresh_token: Some("r".to_string()),
        };
        cache.save(&path).unwrap();
        assert_eq!(TokenCache::load(&path).unwrap(), cache);
    }
}
