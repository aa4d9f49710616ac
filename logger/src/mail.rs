use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailConfig;

pub fn build_message(config: &MailConfig, subject: &str, body: &str) -> Result<Message> {
    Message::builder()
        .from(
            config
                .user
                .parse::<Mailbox>()
                .with_context(|| format!("invalid sender address {}", config.user))?,
        )
        .to(config
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("invalid recipient address {}", config.to))?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .context("failed to build report email")
}

/// Send a plain-text message over implicit TLS (SMTPS). No retries.
pub async fn send_email(config: &MailConfig, subject: &str, body: &str) -> Result<()> {
    let message = build_message(config, subject, body)?;

    let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
        .with_context(|| format!("failed to set up SMTP relay {}", config.smtp_host))?
        .port(config.smtp_port)
        .credentials(Credentials::new(
            config.user.clone(),
            config.app_password.clone(),
        ))
        .build();

    transport
        .send(message)
        .await
        .with_context(|| format!("failed to send report to {}", config.to))?;

    tracing::info!("report sent to {}", config.to);
    Ok(())
}
