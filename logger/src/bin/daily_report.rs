use anyhow::Context;
use spotify_logger::config::{self, MailConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter("daily_report=info,spotify_logger=info")
        .init();

    let db_path = config::db_path_from_env();

    let mail_config =
        MailConfig::from_env().context("Missing GMAIL_USER / GMAIL_APP_PASSWORD (.env.mail)")?;

    spotify_logger::send_daily_report(&db_path, &mail_config).await?;
    println!("Daily report email sent.");

    Ok(())
}
