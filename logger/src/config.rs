use std::path::PathBuf;

pub const SCOPE: &str = "user-read-recently-played user-read-private user-top-read";

/// Spotify caps `limit` on the recently-played endpoint at 50.
pub const PAGE_LIMIT: u32 = 50;
/// 10 pages of 50 covers roughly a day of listening.
pub const MAX_PAGES: u32 = 10;
/// Max ids accepted by the bulk artists endpoint.
pub const ARTIST_BATCH_SIZE: usize = 50;

const DEFAULT_DB_PATH: &str = "spotify.db";
const DEFAULT_TOKEN_CACHE: &str = ".cache-ec2";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 465;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub db_path: PathBuf,
    pub token_cache: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            client_id: required(&lookup, "SPOTIFY_CLIENT_ID")?,
            client_secret: required(&lookup, "SPOTIFY_CLIENT_SECRET")?,
            redirect_uri: required(&lookup, "SPOTIFY_REDIRECT_URI")?,
            db_path: optional(&lookup, "SPOTIFY_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            token_cache: optional(&lookup, "SPOTIFY_TOKEN_CACHE")
                .unwrap_or_else(|| DEFAULT_TOKEN_CACHE.to_string())
                .into(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub user: String,
    pub app_password: String,
    pub to: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let user = required(&lookup, "GMAIL_USER")?;
        let app_password = required(&lookup, "GMAIL_APP_PASSWORD")?;
        let to = optional(&lookup, "MAIL_TO").unwrap_or_else(|| user.clone());

        let smtp_port = match optional(&lookup, "SMTP_PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "SMTP_PORT",
                value,
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Self {
            user,
            app_password,
            to,
            smtp_host: optional(&lookup, "SMTP_HOST")
                .unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port,
        })
    }
}

/// Database location alone, for tools that never talk to Spotify.
pub fn db_path_from_env() -> PathBuf {
    optional(&|name: &str| std::env::var(name).ok(), "SPOTIFY_DB_PATH")
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
        .into()
}

/// Loads `.env` and the mail-only `.env.mail` when they exist. Missing files are fine.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
    dotenvy::from_filename(".env.mail").ok();
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

// Empty values count as unset.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_with_defaults() {
        let vars = env(&[
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
            ("SPOTIFY_REDIRECT_URI", "http://127.0.0.1:8888/callback"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.client_id, "id");
        assert_eq!(config.db_path, PathBuf::from("spotify.db"));
        assert_eq!(config.token_cache, PathBuf::from(".cache-ec2"));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let vars = env(&[
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "  "),
            ("SPOTIFY_REDIRECT_URI", "http://127.0.0.1:8888/callback"),
        ]);
        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SPOTIFY_CLIENT_SECRET"));
    }

    #[test]
    fn test_mail_to_defaults_to_user() {
        let vars = env(&[("GMAIL_USER", "me@example.com"), ("GMAIL_APP_PASSWORD", "pw")]);
        let mail = MailConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(mail.to, "me@example.com");
        assert_eq!(mail.smtp_host, "smtp.gmail.com");
        assert_eq!(mail.smtp_port, 465);
    }

    #[test]
    fn test_mail_rejects_bad_port() {
        let vars = env(&[
            ("GMAIL_USER", "me@example.com"),
            ("GMAIL_APP_PASSWORD", "pw"),
            ("SMTP_PORT", "smtps"),
        ]);
        let err = MailConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SMTP_PORT", .. }));
    }
}
