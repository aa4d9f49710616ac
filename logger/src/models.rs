use serde::Serialize;
use sqlx::FromRow;

/// A row of the `plays` fact table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct PlayRow {
    pub played_at: String,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub album_type: Option<String>,
    pub release_date: Option<String>,
    pub duration_ms: Option<i64>,
    pub popularity: Option<i64>,
    pub spotify_url: Option<String>,
    pub cover_url: Option<String>,
    pub track_href: Option<String>,
    pub explicit: i64,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub is_local: i64,
    pub isrc: Option<String>,
    pub available_markets_count: i64,
    pub context_type: Option<String>,
    pub context_uri: Option<String>,
    pub context_url: Option<String>,
}

/// Edge of the `track_artists` mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistLink {
    pub track_id: String,
    pub artist_id: String,
    pub artist_name: Option<String>,
}

/// A row of the `artists` dimension table.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ArtistRecord {
    pub artist_id: String,
    pub name: Option<String>,
    /// JSON list, e.g. `["indie rock","shoegaze"]`.
    pub genres: String,
    pub followers_total: Option<i64>,
    pub popularity: Option<i64>,
    pub url: Option<String>,
    pub href: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RecentPlay {
    pub played_at: String,
    pub track_name: Option<String>,
    pub artist_name: Option<String>,
}
