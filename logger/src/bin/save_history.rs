use anyhow::Context;
use spotify_logger::config::{self, Config};
use spotify_logger::fetcher::RetryPolicy;
use spotify_logger::report::FetchSummary;
use spotify_logger::spotify::SpotifyClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter("save_history=info,spotify_logger=info")
        .init();

    let config = Config::from_env().context("Missing SPOTIFY_* environment variables (.env)")?;
    let db_path = config.db_path.clone();

    let client = SpotifyClient::new(config).context("Failed to initialize Spotify client")?;
    tracing::info!("Spotify client initialized");

    let outcome = spotify_logger::sync_history(&db_path, &client, RetryPolicy::default()).await?;

    println!("Retrieved items from API: {}", outcome.fetched);
    if outcome.local_plays > 0 {
        println!("Skipped local-file plays: {}", outcome.local_plays);
    }
    println!("Inserted into DB (new): {} rows", outcome.inserted);
    println!(
        "Inserted into artists dim (new): {} rows",
        outcome.enrichment.inserted
    );
    if outcome.enrichment.failed_batches > 0 || outcome.enrichment.skipped_records > 0 {
        println!(
            "Artist enrichment skipped: {} batches, {} records",
            outcome.enrichment.failed_batches, outcome.enrichment.skipped_records
        );
    }

    if let Some(summary) = FetchSummary::from_rows(&outcome.rows) {
        println!("\nQuick summary of the current fetch:");
        println!(" - Most recent play at: {}", summary.most_recent);
        println!(" - Oldest play in this batch: {}", summary.oldest);
        println!(" - Unique tracks: {}", summary.unique_tracks);
        println!(" - Unique artists: {}", summary.unique_artists);
        println!("\n - Last {} plays (chronological):", summary.last_plays.len());
        for (track, artists) in &summary.last_plays {
            println!("   * {} - {}", track, artists);
        }
    }

    println!(
        "\nDone. The full history is accumulating in {} -> plays table.",
        db_path.display()
    );

    Ok(())
}
