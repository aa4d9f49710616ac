use anyhow::Result;
use chrono::NaiveDate;
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;

use crate::models::RecentPlay;
use crate::normalize::NormalizedPlay;

pub const RECENT_PLAYS: i64 = 10;

// played_at is stored as Spotify sends it ('YYYY-MM-DDTHH:MM:SS.sssZ'); the
// first 19 chars with the 'T' swapped out are something strftime can read.
const PLAYED_AT_EPOCH: &str = "strftime('%s', replace(substr(played_at, 1, 19), 'T', ' '))";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStats {
    pub total_plays: i64,
    pub total_unique_tracks: i64,
    pub total_artists: i64,
    pub total_track_artists: i64,
    pub last24h_plays: i64,
    pub most_recent: Option<String>,
    pub oldest: Option<String>,
    /// Oldest first.
    pub recent_plays: Vec<RecentPlay>,
}

pub async fn query_stats(pool: &SqlitePool) -> Result<ReportStats> {
    let total_plays: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plays")
        .fetch_one(pool)
        .await?;

    let total_unique_tracks: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT track_id) FROM plays")
        .fetch_one(pool)
        .await?;

    let total_artists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM artists")
        .fetch_one(pool)
        .await?;

    let total_track_artists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM track_artists")
        .fetch_one(pool)
        .await?;

    let last24h_plays: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM plays WHERE {} >= strftime('%s', 'now', '-1 day')",
        PLAYED_AT_EPOCH
    ))
    .fetch_one(pool)
    .await?;

    let (most_recent, oldest): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT MAX(played_at), MIN(played_at) FROM plays")
            .fetch_one(pool)
            .await?;

    let mut recent_plays = sqlx::query_as::<_, RecentPlay>(&format!(
        "SELECT played_at, track_name, artist_name FROM plays ORDER BY {} DESC, played_at DESC LIMIT ?1",
        PLAYED_AT_EPOCH
    ))
    .bind(RECENT_PLAYS)
    .fetch_all(pool)
    .await?;
    recent_plays.reverse();

    Ok(ReportStats {
        total_plays,
        total_unique_tracks,
        total_artists,
        total_track_artists,
        last24h_plays,
        most_recent,
        oldest,
        recent_plays,
    })
}

pub fn subject_for(date: NaiveDate) -> String {
    format!(
        "Spotify Logger – Daily Report – {} (UTC)",
        date.format("%Y-%m-%d")
    )
}

pub fn build_email_body(stats: &ReportStats) -> String {
    let mut lines = vec![
        "Spotify Logger – Daily Report".to_string(),
        "=".repeat(50),
        String::new(),
        "Totals so far:".to_string(),
        format!("- plays: {}", stats.total_plays),
        format!("- unique tracks: {}", stats.total_unique_tracks),
        format!("- artists (dim): {}", stats.total_artists),
        format!("- track_artists (map): {}", stats.total_track_artists),
        String::new(),
        format!("Plays in last 24h: {}", stats.last24h_plays),
        format!("Oldest play in DB: {}", stats.oldest.as_deref().unwrap_or("-")),
        format!("Most recent play: {}", stats.most_recent.as_deref().unwrap_or("-")),
        String::new(),
        format!("Last {} plays (chronological):", RECENT_PLAYS),
    ];

    for play in &stats.recent_plays {
        lines.push(format!(
            "  * {} | {} | {}",
            play.played_at,
            play.track_name.as_deref().unwrap_or("-"),
            play.artist_name.as_deref().unwrap_or("-")
        ));
    }

    lines.push(String::new());
    lines.push("-- spotify-logger".to_string());
    lines.join("\n")
}

/// Console summary of what a single sync pulled from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub most_recent: String,
    pub oldest: String,
    pub unique_tracks: usize,
    pub unique_artists: usize,
    /// (track, artists), oldest first.
    pub last_plays: Vec<(String, String)>,
}

impl FetchSummary {
    pub fn from_rows(rows: &[NormalizedPlay]) -> Option<Self> {
        let most_recent = rows.iter().map(|r| &r.play.played_at).max()?.clone();
        let oldest = rows.iter().map(|r| &r.play.played_at).min()?.clone();

        let unique_tracks = rows
            .iter()
            .map(|r| r.play.track_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let unique_artists = rows
            .iter()
            .filter_map(|r| r.play.artist_name.as_deref())
            .collect::<HashSet<_>>()
            .len();

        let mut sorted: Vec<&NormalizedPlay> = rows.iter().collect();
        sorted.sort_by(|a, b| a.play.played_at.cmp(&b.play.played_at));
        let skip = sorted.len().saturating_sub(RECENT_PLAYS as usize);
        let last_plays = sorted
            .into_iter()
            .skip(skip)
            .map(|r| {
                (
                    r.play.track_name.clone(),
                    r.play.artist_name.clone().unwrap_or_default(),
                )
            })
            .collect();

        Some(Self {
            most_recent,
            oldest,
            unique_tracks,
            unique_artists,
            last_plays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> ReportStats {
        ReportStats {
            total_plays: 120,
            total_unique_tracks: 80,
            total_artists: 40,
            total_track_artists: 95,
            last24h_plays: 17,
            most_recent: Some("2025-07-27T11:13:43.874Z".to_string()),
            oldest: None,
            recent_plays: vec![RecentPlay {
                played_at: "2025-07-27T11:13:43.874Z".to_string(),
                track_name: Some("Song".to_string()),
                artist_name: None,
            }],
        }
    }

    #[test]
    fn test_body_lists_totals_and_plays() {
        let body = build_email_body(&stats());
        assert!(body.contains("- plays: 120"));
        assert!(body.contains("- unique tracks: 80"));
        assert!(body.contains("- artists (dim): 40"));
        assert!(body.contains("- track_artists (map): 95"));
        assert!(body.contains("Plays in last 24h: 17"));
        assert!(body.contains("Oldest play in DB: -"));
        assert!(body.contains("  * 2025-07-27T11:13:43.874Z | Song | -"));
    }

    #[test]
    fn test_subject_carries_date() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 27).unwrap();
        assert_eq!(
            subject_for(date),
            "Spotify Logger – Daily Report – 2025-07-27 (UTC)"
        );
    }

    #[test]
    fn test_fetch_summary_of_empty_batch() {
        assert_eq!(FetchSummary::from_rows(&[]), None);
    }
}
