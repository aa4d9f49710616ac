use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spotify_logger::config::{self, Config, MailConfig};
use spotify_logger::fetcher::RetryPolicy;
use spotify_logger::spotify::{MusicApi, SpotifyClient};
use spotify_logger::{auth, db, schema};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "spotlog")]
#[command(about = "Spotify listening history logger", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize this machine and cache an OAuth token
    Authorize,

    /// Fetch recent plays, store new ones and backfill artists
    Sync,

    /// Only backfill artists missing from the artists table
    Enrich,

    /// Build the daily report and email it
    Report {
        /// Print the report instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the plays table (and optionally artists) to CSV
    Export {
        #[arg(short, long, default_value = "plays.csv")]
        out: PathBuf,

        /// Also write the artists table to this file
        #[arg(long)]
        artists: Option<PathBuf>,
    },

    /// Show table counts and schema version
    Stats,

    /// List the current user's top track ids
    TopTracks {
        #[arg(short, long, default_value_t = 3)]
        limit: u32,

        /// short_term, medium_term or long_term
        #[arg(short, long, default_value = "short_term")]
        time_range: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter("spotlog=info,spotify_logger=info")
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Authorize => handle_authorize().await,
        Commands::Sync => handle_sync().await,
        Commands::Enrich => handle_enrich().await,
        Commands::Report { dry_run } => handle_report(dry_run).await,
        Commands::Export { out, artists } => handle_export(&out, artists.as_deref()).await,
        Commands::Stats => handle_stats().await,
        Commands::TopTracks { limit, time_range } => handle_top_tracks(limit, &time_range).await,
    }
}

fn load_config() -> Result<Config> {
    Config::from_env().context("Missing SPOTIFY_* environment variables (.env)")
}

async fn handle_authorize() -> Result<()> {
    let config = load_config()?;
    let url = auth::authorize_url(&config)?;

    println!("Open this URL in a browser and approve access:\n\n  {}\n", url);
    print!("Paste the URL you were redirected to: ");
    std::io::stdout().flush()?;

    let mut redirect = String::new();
    std::io::stdin().lock().read_line(&mut redirect)?;

    let code = auth::code_from_redirect(&redirect)?;
    let token = auth::exchange_code(&reqwest::Client::new(), &config, &code).await?;
    token.save(&config.token_cache)?;

    println!("Token cached in {}", config.token_cache.display());
    Ok(())
}

async fn handle_sync() -> Result<()> {
    let config = load_config()?;
    let db_path = config.db_path.clone();
    let client = SpotifyClient::new(config)?;

    let outcome = spotify_logger::sync_history(&db_path, &client, RetryPolicy::default()).await?;

    println!(
        "fetched {}, new plays {}, new artists {} (failed batches {}, skipped records {})",
        outcome.fetched,
        outcome.inserted,
        outcome.enrichment.inserted,
        outcome.enrichment.failed_batches,
        outcome.enrichment.skipped_records
    );
    Ok(())
}

async fn handle_enrich() -> Result<()> {
    let config = load_config()?;
    let db_path = config.db_path.clone();
    let client = SpotifyClient::new(config)?;

    let outcome = spotify_logger::run_enrichment(&db_path, &client).await?;

    println!(
        "missing {}, inserted {}, failed batches {}, skipped records {}",
        outcome.requested, outcome.inserted, outcome.failed_batches, outcome.skipped_records
    );
    Ok(())
}

async fn handle_report(dry_run: bool) -> Result<()> {
    let db_path = config::db_path_from_env();

    if dry_run {
        let (subject, body) = spotify_logger::load_report(&db_path).await?;
        println!("{}\n\n{}", subject, body);
        return Ok(());
    }

    let mail_config =
        MailConfig::from_env().context("Missing GMAIL_USER / GMAIL_APP_PASSWORD (.env.mail)")?;
    spotify_logger::send_daily_report(&db_path, &mail_config).await?;
    println!("Daily report email sent.");
    Ok(())
}

async fn handle_export(out: &Path, artists: Option<&Path>) -> Result<()> {
    let db_path = config::db_path_from_env();
    let (plays, artist_count) = spotify_logger::export_csv(&db_path, out, artists).await?;

    println!("Wrote {} plays to {}", plays, out.display());
    if let (Some(path), Some(count)) = (artists, artist_count) {
        println!("Wrote {} artists to {}", count, path.display());
    }
    Ok(())
}

async fn handle_stats() -> Result<()> {
    let db_path = config::db_path_from_env();
    let pool = db::open(&db_path).await?;

    let plays = db::count_plays(&pool).await?;
    let mappings = db::count_track_artists(&pool).await?;
    let artists = db::count_artists(&pool).await?;
    let missing = db::missing_artist_ids(&pool).await?.len();
    let version = schema::current_version(&pool).await?;
    pool.close().await;

    println!("{}:", db_path.display());
    println!("  schema version: {}", version);
    println!("  plays: {}", plays);
    println!("  track_artists: {}", mappings);
    println!("  artists: {}", artists);
    println!("  artists awaiting enrichment: {}", missing);
    Ok(())
}

async fn handle_top_tracks(limit: u32, time_range: &str) -> Result<()> {
    let client = SpotifyClient::new(load_config()?)?;
    let tracks = client.top_tracks(limit, time_range).await?;

    for track in &tracks {
        let artists: Vec<&str> = track.artists.iter().map(|a| a.name.as_str()).collect();
        let id = track.id.as_deref().unwrap_or("local");
        println!("{}  {} - {}", id, track.name, artists.join(", "));
    }
    Ok(())
}
