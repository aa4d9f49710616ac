use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::path::Path;

pub mod auth;
pub mod config;
pub mod db;
pub mod enrich;
pub mod export;
pub mod fetcher;
pub mod mail;
pub mod models;
pub mod normalize;
pub mod report;
pub mod schema;
pub mod spotify;

use config::{MailConfig, MAX_PAGES, PAGE_LIMIT};
use enrich::EnrichOutcome;
use fetcher::RetryPolicy;
use normalize::NormalizedPlay;
use spotify::MusicApi;

#[derive(Debug)]
pub struct SyncOutcome {
    pub fetched: usize,
    /// Fetched plays of local files, which have no track id and are not stored.
    pub local_plays: usize,
    pub inserted: u64,
    pub enrichment: EnrichOutcome,
    pub rows: Vec<NormalizedPlay>,
}

/// One full sync: fetch → normalize → store, then backfill artists.
///
/// The database is opened and closed separately for the store step and the
/// enrichment step. Any fetch or store error aborts the run; enrichment
/// problems are only counted in the outcome.
pub async fn sync_history<A: MusicApi>(
    db_path: &Path,
    api: &A,
    retry: RetryPolicy,
) -> Result<SyncOutcome> {
    tracing::info!("fetching recently played (up to {} pages)", MAX_PAGES);
    let items = fetcher::fetch_recent(api, PAGE_LIMIT, MAX_PAGES, retry)
        .await
        .context("Failed to fetch recently played")?;
    tracing::info!("retrieved {} items from the API", items.len());

    let rows = normalize::normalize_items(&items);
    let local_plays = items.len() - rows.len();

    let pool = db::open(db_path).await?;
    let inserted = db::save_batch(&pool, &rows)
        .await
        .context("Failed to store plays")?;
    pool.close().await;
    tracing::info!("stored {} new plays", inserted);

    let enrichment = run_enrichment(db_path, api).await?;

    Ok(SyncOutcome {
        fetched: items.len(),
        local_plays,
        inserted,
        enrichment,
        rows,
    })
}

pub async fn run_enrichment<A: MusicApi>(db_path: &Path, api: &A) -> Result<EnrichOutcome> {
    let pool = db::open(db_path).await?;
    let outcome = enrich::enrich_artists(&pool, api).await?;
    pool.close().await;

    if outcome.failed_batches > 0 || outcome.skipped_records > 0 {
        tracing::warn!(
            "artist enrichment skipped {} batches and {} records",
            outcome.failed_batches,
            outcome.skipped_records
        );
    }
    tracing::info!("inserted {} new artists", outcome.inserted);

    Ok(outcome)
}

pub async fn load_report(db_path: &Path) -> Result<(String, String)> {
    let pool = db::open(db_path).await?;
    let stats = report::query_stats(&pool)
        .await
        .context("Failed to query report stats")?;
    pool.close().await;

    let subject = report::subject_for(Utc::now().date_naive());
    Ok((subject, report::build_email_body(&stats)))
}

pub async fn send_daily_report(db_path: &Path, mail_config: &MailConfig) -> Result<()> {
    let (subject, body) = load_report(db_path).await?;
    mail::send_email(mail_config, &subject, &body).await
}

/// Dumps `plays` (and optionally `artists`) to CSV files.
/// Returns the number of plays and artists written.
pub async fn export_csv(
    db_path: &Path,
    plays_out: &Path,
    artists_out: Option<&Path>,
) -> Result<(usize, Option<usize>)> {
    let pool = db::open(db_path).await?;

    let file = File::create(plays_out)
        .with_context(|| format!("failed to create {}", plays_out.display()))?;
    let plays = export::export_plays(&pool, file).await?;

    let artists = match artists_out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Some(export::export_artists(&pool, file).await?)
        }
        None => None,
    };

    pool.close().await;
    Ok((plays, artists))
}
