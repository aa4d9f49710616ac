use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::{self, TokenCache};
use crate::config::Config;

const API_BASE: &str = "https://api.spotify.com/v1";

/// Failures that retrying the same request cannot fix.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unexpected response body from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// True for errors that come from the payload itself, not the transport.
    pub fn is_permanent(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Decode { .. }))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentlyPlayedPage {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
    pub next: Option<String>,
    pub cursors: Option<Cursors>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cursors {
    pub after: Option<String>,
    pub before: Option<String>,
}

/// One listen. `track`, `played_at` and the track's name/album are required;
/// a page missing any of them fails to decode and aborts the sync.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayHistoryItem {
    pub track: Track,
    pub played_at: String,
    pub context: Option<PlayContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    /// Null for local files.
    pub id: Option<String>,
    pub name: String,
    pub album: Album,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    pub duration_ms: Option<i64>,
    pub popularity: Option<i64>,
    pub external_urls: Option<ExternalUrls>,
    pub href: Option<String>,
    pub explicit: Option<bool>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub is_local: Option<bool>,
    pub external_ids: Option<ExternalIds>,
    pub available_markets: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub name: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimpleArtist {
    // Local files carry artists without an id.
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayContext {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub uri: Option<String>,
    pub external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalIds {
    pub isrc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullArtist {
    pub id: String,
    pub name: Option<String>,
    pub genres: Option<Vec<String>>,
    pub followers: Option<Followers>,
    pub popularity: Option<i64>,
    pub external_urls: Option<ExternalUrls>,
    pub href: Option<String>,
    pub images: Option<Vec<Image>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Followers {
    pub total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ArtistsResponse {
    #[serde(default)]
    artists: Vec<Option<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    items: Vec<Track>,
}

/// The read endpoints the logger consumes.
///
/// `artists` hands back each entry undecoded (`None` for the nulls Spotify
/// returns for unknown ids) so one malformed artist does not sink its batch.
#[allow(async_fn_in_trait)]
pub trait MusicApi {
    async fn recently_played(&self, limit: u32, before_ms: i64) -> Result<RecentlyPlayedPage>;

    async fn artists(&self, ids: &[String]) -> Result<Vec<Option<serde_json::Value>>>;

    async fn top_tracks(&self, limit: u32, time_range: &str) -> Result<Vec<Track>>;
}

pub struct SpotifyClient {
    http: Client,
    config: Config,
    token: Mutex<TokenCache>,
}

impl SpotifyClient {
    /// Fails when no token has been cached yet (see `spotlog authorize`).
    pub fn new(config: Config) -> Result<Self> {
        let token = TokenCache::load(&config.token_cache)?;
        Ok(Self {
            http: Client::new(),
            config,
            token: Mutex::new(token),
        })
    }

    async fn bearer(&self) -> Result<String> {
        let mut token = self.token.lock().await;

        if token.is_expired(Utc::now().timestamp()) {
            let refresh_token = token
                .refresh_token
                .clone()
                .context("access token expired and no refresh token is cached")?;

            tracing::debug!("access token expired, refreshing");
            let refreshed = auth::refresh(&self.http, &self.config, &refresh_token).await?;
            refreshed.save(&self.config.token_cache)?;
            *token = refreshed;
        }

        Ok(token.access_token.clone())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let bearer = self.bearer().await?;
        let url = format!("{}{}", API_BASE, path);

        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", bearer))
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("spotify {} returned {}: {}", path, status, body);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read response from {}", path))?;

        serde_json::from_str(&body).map_err(|source| {
            anyhow::Error::from(ApiError::Decode {
                path: path.to_string(),
                source,
            })
        })
    }
}

impl MusicApi for SpotifyClient {
    async fn recently_played(&self, limit: u32, before_ms: i64) -> Result<RecentlyPlayedPage> {
        self.get_json(
            "/me/player/recently-played",
            &[("limit", limit.to_string()), ("before", before_ms.to_string())],
        )
        .await
    }

    async fn artists(&self, ids: &[String]) -> Result<Vec<Option<serde_json::Value>>> {
        let response: ArtistsResponse = self
            .get_json("/artists", &[("ids", ids.join(","))])
            .await?;
        Ok(response.artists)
    }

    async fn top_tracks(&self, limit: u32, time_range: &str) -> Result<Vec<Track>> {
        let response: TopTracksResponse = self
            .get_json(
                "/me/top/tracks",
                &[("limit", limit.to_string()), ("time_range", time_range.to_string())],
            )
            .await?;
        Ok(response.items)
    }
}
