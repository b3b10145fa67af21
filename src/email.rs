//! Email delivery of digests and articles over SMTP.
//!
//! Messages are `multipart/alternative`: the Markdown text as the plain part
//! and its HTML rendering as the rich part. Port 465 uses implicit TLS; any
//! other port upgrades with STARTTLS.

use crate::outputs::html::markdown_to_html;
use chrono::NaiveDate;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::{info, instrument};

/// Port that selects implicit TLS instead of STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email is not configured: {0} is missing")]
    NotConfigured(&'static str),
    #[error("invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    #[error("failed to build email: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Something that can deliver a subject and Markdown body.
pub trait Mailer: Send + Sync {
    fn send(&self, subject: &str, body: &str) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// SMTP server and account settings.
#[derive(Clone)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub sender: Option<String>,
    pub password: Option<String>,
    pub receiver: Option<String>,
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("sender", &self.sender)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("receiver", &self.receiver)
            .finish()
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, MailError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(MailError::NotConfigured(name))
}

/// Subject line of the daily digest.
pub fn digest_subject(date: NaiveDate, partial: bool) -> String {
    let suffix = if partial { " (partial)" } else { "" };
    format!("📰 Global News Digest - {}{suffix}", date.format("%Y-%m-%d"))
}

/// Subject line of the evening article.
pub fn article_subject(date: NaiveDate) -> String {
    format!("🌙 AI × Finance Evening Read - {}", date.format("%Y-%m-%d"))
}

/// Build the multipart message for `body`.
pub fn build_message(from: &Mailbox, to: &Mailbox, subject: &str, body: &str) -> Result<Message, MailError> {
    let message = Message::builder()
        .from(from.clone())
        .to(to.clone())
        .subject(subject)
        .multipart(MultiPart::alternative_plain_html(body.to_string(), markdown_to_html(body)))?;
    Ok(message)
}

/// [`Mailer`] backed by a `lettre` async SMTP transport.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .field("to", &self.to.to_string())
            .finish()
    }
}

impl SmtpMailer {
    /// Validate settings and build the transport. No connection is opened yet.
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let sender = required(&config.sender, "SENDER_EMAIL")?;
        let password = required(&config.password, "SENDER_PASSWORD")?;
        let receiver = required(&config.receiver, "RECEIVER_EMAIL")?;
        let from: Mailbox = sender.parse()?;
        let to: Mailbox = receiver.parse()?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
        };
        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .build();

        Ok(Self { transport, from, to })
    }
}

impl Mailer for SmtpMailer {
    #[instrument(level = "info", skip_all, fields(subject = %subject))]
    async fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
        let message = build_message(&self.from, &self.to, subject, body)?;
        self.transport.send(message).await?;
        info!(to = %self.to, "Email sent");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every message instead of sending it.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingMailer {
        pub(crate) sent: Mutex<Vec<(String, String)>>,
        pub(crate) fail: bool,
    }

    impl Mailer for RecordingMailer {
        async fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
            if self.fail {
                return Err(MailError::NotConfigured("SENDER_EMAIL"));
            }
            self.sent.lock().unwrap().push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn config() -> MailConfig {
        MailConfig {
            server: "smtp.example.com".to_string(),
            port: 587,
            sender: Some("digest@example.com".to_string()),
            password: Some("secret".to_string()),
            receiver: Some("reader@example.com".to_string()),
        }
    }

    #[test]
    fn test_subjects() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 6).unwrap();
        assert_eq!(digest_subject(date, false), "📰 Global News Digest - 2025-05-06");
        assert_eq!(digest_subject(date, true), "📰 Global News Digest - 2025-05-06 (partial)");
        assert_eq!(article_subject(date), "🌙 AI × Finance Evening Read - 2025-05-06");
    }

    #[test]
    fn test_missing_credentials_are_not_configured() {
        let mut cfg = config();
        cfg.password = None;
        assert!(matches!(
            SmtpMailer::new(&cfg),
            Err(MailError::NotConfigured("SENDER_PASSWORD"))
        ));
        let mut cfg = config();
        cfg.receiver = Some("  ".to_string());
        assert!(matches!(
            SmtpMailer::new(&cfg),
            Err(MailError::NotConfigured("RECEIVER_EMAIL"))
        ));
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let mut cfg = config();
        cfg.sender = Some("not an address".to_string());
        assert!(matches!(SmtpMailer::new(&cfg), Err(MailError::InvalidAddress(_))));
    }

    #[test]
    fn test_message_carries_plain_and_html_parts() {
        let from: Mailbox = "digest@example.com".parse().unwrap();
        let to: Mailbox = "reader@example.com".parse().unwrap();
        let message = build_message(&from, &to, "Digest", "## Finance\n**Fed** holds").unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let shown = format!("{:?}", config());
        assert!(!shown.contains("secret"));
    }
}
