use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::spotify::{ApiError, MusicApi, PlayHistoryItem, RecentlyPlayedPage};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Walk recently-played backwards from `before_ms`, one page at a time.
///
/// Each next page asks for plays strictly older than the oldest play seen so
/// far. Stops at the first empty page or after `max_pages`, so at most
/// `limit * max_pages` items come back, newest first.
pub async fn fetch_recent_paginated<A: MusicApi>(
    api: &A,
    limit: u32,
    max_pages: u32,
    before_ms: i64,
    retry: RetryPolicy,
) -> Result<Vec<PlayHistoryItem>> {
    let mut all_items = Vec::new();
    let mut before = before_ms;

    for page in 0..max_pages {
        let response = fetch_page(api, limit, before, retry)
            .await
            .with_context(|| format!("failed to fetch recently played page {}", page + 1))?;

        let Some(oldest) = response.items.last() else {
            tracing::debug!("page {} is empty, stopping", page + 1);
            break;
        };

        before = played_at_ms(&oldest.played_at)? - 1;

        tracing::debug!(
            "page {}: {} items (total so far: {})",
            page + 1,
            response.items.len(),
            all_items.len() + response.items.len()
        );
        all_items.extend(response.items);
    }

    Ok(all_items)
}

/// Same as [`fetch_recent_paginated`], starting from the current time.
pub async fn fetch_recent<A: MusicApi>(
    api: &A,
    limit: u32,
    max_pages: u32,
    retry: RetryPolicy,
) -> Result<Vec<PlayHistoryItem>> {
    fetch_recent_paginated(api, limit, max_pages, Utc::now().timestamp_millis(), retry).await
}

async fn fetch_page<A: MusicApi>(
    api: &A,
    limit: u32,
    before: i64,
    retry: RetryPolicy,
) -> Result<RecentlyPlayedPage> {
    let attempts = retry.max_attempts.max(1);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match api.recently_played(limit, before).await {
            Ok(page) => return Ok(page),
            Err(e) if ApiError::is_permanent(&e) => {
                tracing::error!("recently played returned an unusable page: {}", e);
                return Err(e);
            }
            Err(e) if attempt < attempts => {
                let delay = backoff(retry.base_delay, attempt);
                tracing::warn!(
                    "recently played attempt {}/{} failed: {}; retrying in {}ms",
                    attempt,
                    attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!("recently played failed after {} attempts: {}", attempts, e);
                return Err(e);
            }
        }
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
}

/// `2025-07-27T11:13:43.874Z` → epoch milliseconds. Fractional seconds are optional.
pub fn played_at_ms(played_at: &str) -> Result<i64> {
    let parsed = DateTime::parse_from_rfc3339(played_at)
        .with_context(|| format!("unparsable played_at timestamp: {}", played_at))?;
    Ok(parsed.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_played_at_ms_with_fraction() {
        assert_eq!(
            played_at_ms("2025-07-27T11:13:43.874Z").unwrap(),
            1_753_614_823_874
        );
    }

    #[test]
    fn test_played_at_ms_without_fraction() {
        assert_eq!(played_at_ms("2025-07-27T11:13:43Z").unwrap(), 1_753_614_823_000);
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 1), Duration::from_millis(500));
        assert_eq!(backoff(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff(base, 4), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_saturates_on_large_attempts() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(backoff(Duration::MAX, 3), Duration::MAX);
    }

    #[test]
    fn test_played_at_ms_rejects_garbage() {
        assert!(played_at_ms("yesterday").is_err());
    }
}
