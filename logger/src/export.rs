//! CSV dumps of the `plays` and `artists` tables, one header row plus one
//! record per table row.

use anyhow::{Context, Result};
use futures::TryStreamExt;
use sqlx::sqlite::SqlitePool;
use std::io::Write;

use crate::models::{ArtistRecord, PlayRow};

// Rows written by older schema versions can hold NULL in columns that newer
// rows always fill.
const SELECT_PLAYS: &str = r#"
SELECT played_at, track_id, COALESCE(track_name, '') AS track_name, artist_name,
       album_name, album_type, release_date, duration_ms, popularity, spotify_url,
       cover_url, track_href, COALESCE(explicit, 0) AS explicit, track_number,
       disc_number, COALESCE(is_local, 0) AS is_local, isrc,
       COALESCE(available_markets_count, 0) AS available_markets_count,
       context_type, context_uri, context_url
FROM plays
ORDER BY played_at
"#;

const SELECT_ARTISTS: &str = r#"
SELECT artist_id, name, COALESCE(genres, '[]') AS genres, followers_total,
       popularity, url, href, image_url
FROM artists
ORDER BY artist_id
"#;

/// Writes every play, oldest first. Returns the number of records written.
pub async fn export_plays<W: Write>(pool: &SqlitePool, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let mut rows = sqlx::query_as::<_, PlayRow>(SELECT_PLAYS).fetch(pool);

    let mut written = 0;
    while let Some(row) = rows.try_next().await? {
        writer
            .serialize(&row)
            .with_context(|| format!("failed to write play {} at {}", row.track_id, row.played_at))?;
        written += 1;
    }

    writer.flush().context("failed to flush plays CSV")?;
    tracing::debug!("exported {} plays", written);
    Ok(written)
}

pub async fn export_artists<W: Write>(pool: &SqlitePool, out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    let mut rows = sqlx::query_as::<_, ArtistRecord>(SELECT_ARTISTS).fetch(pool);

    let mut written = 0;
    while let Some(row) = rows.try_next().await? {
        writer
            .serialize(&row)
            .with_context(|| format!("failed to write artist {}", row.artist_id))?;
        written += 1;
    }

    writer.flush().context("failed to flush artists CSV")?;
    tracing::debug!("exported {} artists", written);
    Ok(written)
}
