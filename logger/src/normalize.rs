//! Flattens nested play-history items into `plays` rows and their
//! `track_artists` edges.
//!
//! Plays of local files have no track id and cannot be keyed, so they are
//! left out.

use std::collections::HashSet;

use crate::models::{ArtistLink, PlayRow};
use crate::spotify::{Image, PlayHistoryItem};

const COVER_HEIGHT: u32 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPlay {
    pub play: PlayRow,
    pub artists: Vec<ArtistLink>,
}

pub fn normalize_items(items: &[PlayHistoryItem]) -> Vec<NormalizedPlay> {
    let rows: Vec<NormalizedPlay> = items.iter().filter_map(normalize_item).collect();

    let skipped = items.len() - rows.len();
    if skipped > 0 {
        tracing::debug!("skipped {} plays without a track id (local files)", skipped);
    }

    rows
}

/// `None` when the track has no id.
pub fn normalize_item(item: &PlayHistoryItem) -> Option<NormalizedPlay> {
    let track = &item.track;
    let track_id = track.id.as_deref().filter(|id| !id.is_empty())?;
    let album = &track.album;
    let context = item.context.as_ref();

    let artist_name = if track.artists.is_empty() {
        None
    } else {
        Some(
            track
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    };

    let mut seen = HashSet::new();
    let artists = track
        .artists
        .iter()
        .filter_map(|a| {
            let id = a.id.as_deref().filter(|id| !id.is_empty())?;
            seen.insert(id.to_string()).then(|| ArtistLink {
                track_id: track_id.to_string(),
                artist_id: id.to_string(),
                artist_name: Some(a.name.clone()).filter(|n| !n.is_empty()),
            })
        })
        .collect();

    let play = PlayRow {
        played_at: item.played_at.clone(),
        track_id: track_id.to_string(),
        track_name: track.name.clone(),
        artist_name,
        album_name: album.name.clone(),
        album_type: album.album_type.clone(),
        release_date: album.release_date.clone(),
        duration_ms: track.duration_ms,
        popularity: track.popularity,
        spotify_url: track.external_urls.as_ref().and_then(|u| u.spotify.clone()),
        cover_url: pick_cover_300(album.images.as_deref().unwrap_or_default()),
        track_href: track.href.clone(),
        explicit: flag(track.explicit),
        track_number: track.track_number,
        disc_number: track.disc_number,
        is_local: flag(track.is_local),
        isrc: track.external_ids.as_ref().and_then(|ids| ids.isrc.clone()),
        available_markets_count: track
            .available_markets
            .as_ref()
            .map_or(0, |markets| markets.len() as i64),
        context_type: context.and_then(|c| c.kind.clone()),
        context_uri: context.and_then(|c| c.uri.clone()),
        context_url: context
            .and_then(|c| c.external_urls.as_ref())
            .and_then(|u| u.spotify.clone()),
    };

    Some(NormalizedPlay { play, artists })
}

/// Prefer the 300px-high cover, else the first one listed.
pub fn pick_cover_300(images: &[Image]) -> Option<String> {
    images
        .iter()
        .find(|img| img.height == Some(COVER_HEIGHT))
        .or_else(|| images.first())
        .map(|img| img.url.clone())
}

fn flag(value: Option<bool>) -> i64 {
    i64::from(value.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(url: &str, height: u32) -> Image {
        Image {
            url: url.to_string(),
            height: Some(height),
            width: Some(height),
        }
    }

    fn item(value: serde_json::Value) -> PlayHistoryItem {
        serde_json::from_value(value).unwrap()
    }

    fn normalize_json(value: serde_json::Value) -> NormalizedPlay {
        normalize_item(&item(value)).unwrap()
    }

    #[test]
    fn test_cover_prefers_exact_300() {
        let images = vec![image("big", 640), image("mid", 300), image("small", 64)];
        assert_eq!(pick_cover_300(&images).as_deref(), Some("mid"));
    }

    #[test]
    fn test_cover_falls_back_to_first() {
        let images = vec![image("big", 640), image("small", 64)];
        assert_eq!(pick_cover_300(&images).as_deref(), Some("big"));
    }

    #[test]
    fn test_cover_empty_list_is_none() {
        assert_eq!(pick_cover_300(&[]), None);
    }

    #[test]
    fn test_full_item() {
        let normalized = normalize_json(json!({
            "played_at": "2025-07-27T11:13:43.874Z",
            "context": {
                "type": "playlist",
                "uri": "spotify:playlist:p1",
                "external_urls": { "spotify": "https://open.spotify.com/playlist/p1" }
            },
            "track": {
                "id": "t1",
                "name": "Song",
                "href": "https://api.spotify.com/v1/tracks/t1",
                "duration_ms": 201000,
                "popularity": 55,
                "explicit": true,
                "is_local": false,
                "track_number": 3,
                "disc_number": 1,
                "external_ids": { "isrc": "USRC17607839" },
                "external_urls": { "spotify": "https://open.spotify.com/track/t1" },
                "available_markets": ["HU", "US", "DE"],
                "album": {
                    "name": "Album",
                    "album_type": "single",
                    "release_date": "2024-01-01",
                    "images": [
                        { "url": "cover640", "height": 640, "width": 640 },
                        { "url": "cover300", "height": 300, "width": 300 }
                    ]
                },
                "artists": [
                    { "id": "a1", "name": "First" },
                    { "id": "a2", "name": "Second" }
                ]
            }
        }));

        let play = &normalized.play;
        assert_eq!(play.artist_name.as_deref(), Some("First, Second"));
        assert_eq!(play.cover_url.as_deref(), Some("cover300"));
        assert_eq!(play.explicit, 1);
        assert_eq!(play.is_local, 0);
        assert_eq!(play.available_markets_count, 3);
        assert_eq!(play.isrc.as_deref(), Some("USRC17607839"));
        assert_eq!(play.context_type.as_deref(), Some("playlist"));
        assert_eq!(
            play.context_url.as_deref(),
            Some("https://open.spotify.com/playlist/p1")
        );

        let ids: Vec<&str> = normalized
            .artists
            .iter()
            .map(|a| a.artist_id.as_str())
            .collect();
        assert_eq!(ids, ["a1", "a2"]);
        assert!(normalized.artists.iter().all(|a| a.track_id == "t1"));
    }

    #[test]
    fn test_contextless_play_has_null_context_fields() {
        let normalized = normalize_json(json!({
            "played_at": "2025-07-27T11:13:43.874Z",
            "context": null,
            "track": { "id": "t1", "name": "Song", "album": {}, "artists": [] }
        }));

        assert_eq!(normalized.play.context_type, None);
        assert_eq!(normalized.play.context_uri, None);
        assert_eq!(normalized.play.context_url, None);
        assert_eq!(normalized.play.artist_name, None);
        assert_eq!(normalized.play.cover_url, None);
        assert_eq!(normalized.play.explicit, 0);
        assert!(normalized.artists.is_empty());
    }

    #[test]
    fn test_artists_without_id_are_not_mapped() {
        let normalized = normalize_json(json!({
            "played_at": "2025-07-27T11:13:43.874Z",
            "track": {
                "id": "t1",
                "name": "Song",
                "album": {},
                "artists": [
                    { "id": null, "name": "Local Artist" },
                    { "id": "a1", "name": "Known" },
                    { "id": "a1", "name": "Known" }
                ]
            }
        }));

        assert_eq!(
            normalized.play.artist_name.as_deref(),
            Some("Local Artist, Known, Known")
        );
        assert_eq!(normalized.artists.len(), 1);
        assert_eq!(normalized.artists[0].artist_name.as_deref(), Some("Known"));
    }

    #[test]
    fn test_local_file_plays_are_left_out() {
        let items = vec![
            item(json!({
                "played_at": "2025-07-27T11:13:43.874Z",
                "track": {
                    "id": "t1",
                    "name": "Song",
                    "album": {},
                    "artists": [{ "id": "a1", "name": "Known" }]
                }
            })),
            item(json!({
                "played_at": "2025-07-27T11:10:00.000Z",
                "track": {
                    "id": null,
                    "is_local": true,
                    "name": "home_recording.mp3",
                    "album": {},
                    "artists": [{ "id": null, "name": "Me" }]
                }
            })),
        ];

        assert!(normalize_item(&items[1]).is_none());

        let rows = normalize_items(&items);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].play.track_id, "t1");
        assert_eq!(rows[0].artists.len(), 1);
    }
}
