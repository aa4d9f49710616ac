use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::models::ArtistRecord;
use crate::normalize::NormalizedPlay;
use crate::schema;

/// Open (creating if needed) the logger database and bring its schema up to date.
///
/// One connection: the logger is the only writer and runs one step at a time.
/// Callers close the pool when their fetch, enrichment or report step is done.
pub async fn open(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))?;

    schema::migrate(&pool).await?;

    Ok(pool)
}

/// Insert a normalized batch; returns how many plays were not already stored.
///
/// `(played_at, track_id)` is the primary key, so replays of the same history
/// window are ignored. Mapping rows are written for every play in the batch,
/// including ones that were already stored, which also repairs missing edges.
pub async fn save_batch(pool: &SqlitePool, batch: &[NormalizedPlay]) -> Result<u64> {
    if batch.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await.map_err(|e| {
        tracing::error!("Failed to begin transaction: {}", e);
        e
    })?;

    let mut inserted = 0;
    for NormalizedPlay { play, .. } in batch {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO plays (
                played_at, track_id, track_name, artist_name, album_name, album_type,
                release_date, duration_ms, popularity, spotify_url, cover_url, track_href,
                explicit, track_number, disc_number, is_local, isrc, available_markets_count,
                context_type, context_uri, context_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            "#,
        )
        .bind(&play.played_at)
        .bind(&play.track_id)
        .bind(&play.track_name)
        .bind(&play.artist_name)
        .bind(&play.album_name)
        .bind(&play.album_type)
        .bind(&play.release_date)
        .bind(play.duration_ms)
        .bind(play.popularity)
        .bind(&play.spotify_url)
        .bind(&play.cover_url)
        .bind(&play.track_href)
        .bind(play.explicit)
        .bind(play.track_number)
        .bind(play.disc_number)
        .bind(play.is_local)
        .bind(&play.isrc)
        .bind(play.available_markets_count)
        .bind(&play.context_type)
        .bind(&play.context_uri)
        .bind(&play.context_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(
                "Failed to insert play {} at {}: {}",
                play.track_id,
                play.played_at,
                e
            );
            e
        })?;

        inserted += result.rows_affected();
    }

    for link in batch.iter().flat_map(|p| p.artists.iter()) {
        sqlx::query(
            "INSERT OR IGNORE INTO track_artists (track_id, artist_id, artist_name) VALUES (?1, ?2, ?3)",
        )
        .bind(&link.track_id)
        .bind(&link.artist_id)
        .bind(&link.artist_name)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to commit transaction: {}", e);
        e
    })?;

    Ok(inserted)
}

/// Artist ids referenced by `track_artists` that have no `artists` row yet.
pub async fn missing_artist_ids(pool: &SqlitePool) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar(
        r#"
        SELECT DISTINCT ta.artist_id
        FROM track_artists ta
        LEFT JOIN artists a ON a.artist_id = ta.artist_id
        WHERE a.artist_id IS NULL
        ORDER BY ta.artist_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Returns true when the artist was new. Existing artists are left untouched.
pub async fn insert_artist(pool: &SqlitePool, artist: &ArtistRecord) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO artists
            (artist_id, name, genres, followers_total, popularity, url, href, image_url)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&artist.artist_id)
    .bind(&artist.name)
    .bind(&artist.genres)
    .bind(artist.followers_total)
    .bind(artist.popularity)
    .bind(&artist.url)
    .bind(&artist.href)
    .bind(&artist.image_url)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn get_artist(pool: &SqlitePool, artist_id: &str) -> Result<Option<ArtistRecord>> {
    let artist = sqlx::query_as::<_, ArtistRecord>(
        r#"
        SELECT artist_id, name, genres, followers_total, popularity, url, href, image_url
        FROM artists
        WHERE artist_id = ?1
        "#,
    )
    .bind(artist_id)
    .fetch_optional(pool)
    .await?;

    Ok(artist)
}

pub async fn count_plays(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM plays")
        .fetch_one(pool)
        .await?)
}

pub async fn count_track_artists(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM track_artists")
        .fetch_one(pool)
        .await?)
}

pub async fn count_artists(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM artists")
        .fetch_one(pool)
        .await?)
}
