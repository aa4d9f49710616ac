//! Backfills the `artists` dimension from artist ids seen in `track_artists`.
//!
//! Enrichment is best effort. A failed batch request or a malformed artist is
//! logged, counted and skipped; batches already written stay written.

use anyhow::Result;
use sqlx::sqlite::SqlitePool;

use crate::config::ARTIST_BATCH_SIZE;
use crate::db;
use crate::models::ArtistRecord;
use crate::spotify::{FullArtist, MusicApi};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOutcome {
    /// Missing ids found before the run.
    pub requested: usize,
    pub inserted: usize,
    pub failed_batches: usize,
    /// Null, malformed or unwritable entries inside otherwise good batches.
    pub skipped_records: usize,
}

pub async fn enrich_artists<A: MusicApi>(pool: &SqlitePool, api: &A) -> Result<EnrichOutcome> {
    let ids = db::missing_artist_ids(pool).await?;
    let mut outcome = EnrichOutcome {
        requested: ids.len(),
        ..Default::default()
    };

    if ids.is_empty() {
        return Ok(outcome);
    }

    tracing::info!("enriching {} missing artists", ids.len());

    for (index, chunk) in ids.chunks(ARTIST_BATCH_SIZE).enumerate() {
        let entries = match api.artists(chunk).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    "artist batch {} ({} ids) failed, skipping: {}",
                    index + 1,
                    chunk.len(),
                    e
                );
                outcome.failed_batches += 1;
                continue;
            }
        };

        // Spotify answers null for ids it can no longer resolve.
        outcome.skipped_records += chunk.len().saturating_sub(entries.len());

        for entry in entries {
            let Some(value) = entry else {
                outcome.skipped_records += 1;
                continue;
            };

            let artist = match serde_json::from_value::<FullArtist>(value) {
                Ok(artist) => artist,
                Err(e) => {
                    tracing::warn!("skipping malformed artist record: {}", e);
                    outcome.skipped_records += 1;
                    continue;
                }
            };

            match db::insert_artist(pool, &artist_record(&artist)).await {
                Ok(true) => outcome.inserted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("failed to store artist {}: {}", artist.id, e);
                    outcome.skipped_records += 1;
                }
            }
        }

        tracing::debug!("artist batch {} done ({} inserted so far)", index + 1, outcome.inserted);
    }

    Ok(outcome)
}

pub fn artist_record(artist: &FullArtist) -> ArtistRecord {
    let genres = artist.genres.clone().unwrap_or_default();

    ArtistRecord {
        artist_id: artist.id.clone(),
        name: artist.name.clone(),
        genres: serde_json::to_string(&genres).unwrap_or_else(|_| "[]".to_string()),
        followers_total: artist.followers.as_ref().and_then(|f| f.total),
        popularity: artist.popularity,
        url: artist.external_urls.as_ref().and_then(|u| u.spotify.clone()),
        href: artist.href.clone(),
        image_url: artist
            .images
            .as_ref()
            .and_then(|images| images.first())
            .map(|img| img.url.clone()),
    }
}
