//! Mail transport abstraction
//!
//! The dispatch worker talks to a `Transport`, not to lettre directly,
//! so tests can swap in an in-memory transport and the worker logic can
//! be exercised without a relay.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use lettermill_common::config::SmtpConfig;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use uuid::Uuid;

/// A fully rendered email ready for submission
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

/// Accepted-for-delivery receipt from the transport
#[derive(Debug, Clone)]
pub struct TransportReceipt {
    /// Provider-side message id, later correlated by webhook events
    pub provider_message_id: String,
}

/// Transport failure classification. The worker's retry decision hangs
/// entirely on this split.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Worth retrying after backoff (connection refused, 4xx replies)
    #[error("Transient transport failure: {0}")]
    Transient(String),

    /// Never worth retrying (malformed message, policy rejection)
    #[error("Permanent transport failure: {0}")]
    Permanent(String),

    /// The relay rejected the recipient address itself
    #[error("Recipient bounced: {0}")]
    Bounce(String),
}

/// Mail submission interface
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<TransportReceipt, TransportError>;
}

/// SMTP transport backed by lettre
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    hostname: String,
}

impl SmtpMailer {
    /// Build the relay connection from config. TLS mode selection follows
    /// the config flags: implicit TLS, then STARTTLS, then plaintext for
    /// local relays.
    pub fn from_config(config: &SmtpConfig, hostname: &str) -> Result<Self, TransportError> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Permanent(format!("SMTP relay setup: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Permanent(format!("SMTP relay setup: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = builder
            .timeout(Some(StdDuration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            mailer,
            hostname: hostname.to_string(),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<(Message, String), TransportError> {
        let from: Mailbox = match &email.from_name {
            Some(name) => format!("{} <{}>", name, email.from_address),
            None => email.from_address.clone(),
        }
        .parse()
        .map_err(|e| TransportError::Permanent(format!("Invalid from address: {}", e)))?;

        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| TransportError::Bounce(format!("Invalid recipient address: {}", e)))?;

        let message_id = format!("<{}.{}@{}>", Uuid::new_v4(), Utc::now().timestamp(), self.hostname);

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.clone()));

        if let Some(reply_to) = &email.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|e| TransportError::Permanent(format!("Invalid reply-to: {}", e)))?;
            builder = builder.reply_to(mailbox);
        }

        let message = match (&email.html_body, &email.text_body) {
            (Some(html), Some(text)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(text.clone()))
                    .singlepart(SinglePart::html(html.clone())),
            ),
            (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, None) => {
                return Err(TransportError::Permanent("Campaign has no body".to_string()));
            }
        }
        .map_err(|e| TransportError::Permanent(format!("Failed to build email: {}", e)))?;

        Ok((message, message_id))
    }
}

/// Classify a relay error string into the retry taxonomy. Lettre does
/// not expose structured reply codes on every error path, so this falls
/// back to string matching the way relay replies actually read.
fn classify_smtp_error(error: &str) -> TransportError {
    let lower = error.to_lowercase();
    if error.contains("5.1.1")
        || error.contains("550")
        || lower.contains("user unknown")
        || lower.contains("does not exist")
        || lower.contains("no such user")
    {
        TransportError::Bounce(error.to_string())
    } else if error.contains("552") || error.contains("553") || error.contains("554") {
        TransportError::Permanent(error.to_string())
    } else {
        // 4xx replies, timeouts, connection errors
        TransportError::Transient(error.to_string())
    }
}

#[async_trait]
impl Transport for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<TransportReceipt, TransportError> {
        let (message, message_id) = self.build_message(email)?;

        match self.mailer.send(message).await {
            Ok(_) => Ok(TransportReceipt {
                provider_message_id: message_id,
            }),
            Err(e) => Err(classify_smtp_error(&e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_hard_bounce() {
        let err = classify_smtp_error("550 5.1.1 User unknown");
        assert!(matches!(err, TransportError::Bounce(_)));

        let err = classify_smtp_error("recipient does not exist");
        assert!(matches!(err, TransportError::Bounce(_)));
    }

    #[test]
    fn test_classify_permanent() {
        let err = classify_smtp_error("552 message size exceeds limit");
        assert!(matches!(err, TransportError::Permanent(_)));
    }

    #[test]
    fn test_classify_transient() {
        let err = classify_smtp_error("451 try again later");
        assert!(matches!(err, TransportError::Transient(_)));

        let err = classify_smtp_error("connection refused");
        assert!(matches!(err, TransportError::Transient(_)));
    }

    #[test]
    fn test_outgoing_email_fields() {
        let email = OutgoingEmail {
            to: "reader@example.com".to_string(),
            from_address: "news@example.com".to_string(),
            from_name: Some("Example News".to_string()),
            reply_to: None,
            subject: "Hello".to_string(),
            html_body: Some("<p>Hi</p>".to_string()),
            text_body: Some("Hi".to_string()),
        };
        assert_eq!(email.to, "reader@example.com");
    }
}
