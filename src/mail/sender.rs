//! Outbound replies via SMTP (lettre).

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::complaint::ResponseDraft;
use crate::error::DeliveryError;
use crate::mail::EmailConfig;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers a formatted reply to a customer.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Send `draft` to `recipient`. `in_reply_to` is the original
    /// `Message-ID` (without angle brackets) when known.
    async fn send(
        &self,
        draft: &ResponseDraft,
        recipient: &str,
        in_reply_to: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// SMTP sender with STARTTLS (or implicit TLS on port 465).
pub struct SmtpSender {
    config: EmailConfig,
}

impl SmtpSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(config: &EmailConfig) -> Result<SmtpTransport, DeliveryError> {
        let builder = if config.smtp_port == 465 {
            SmtpTransport::relay(&config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_host)
        }
        .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?;

        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );
        Ok(builder
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build())
    }
}

/// Build the outgoing message. Subject and body are used exactly as given.
pub(crate) fn build_message(
    from: &str,
    draft: &ResponseDraft,
    recipient: &str,
    in_reply_to: Option<&str>,
) -> Result<Message, DeliveryError> {
    let from: Mailbox = from.parse().map_err(|e| DeliveryError::InvalidAddress {
        address: from.to_string(),
        reason: format!("{e}"),
    })?;
    let to: Mailbox = recipient.parse().map_err(|e| DeliveryError::InvalidAddress {
        address: recipient.to_string(),
        reason: format!("{e}"),
    })?;

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(draft.subject.clone())
        .header(ContentType::TEXT_PLAIN);
    if let Some(id) = in_reply_to {
        let id = format!("<{}>", id.trim_matches(|c| c == '<' || c == '>'));
        builder = builder.in_reply_to(id.clone()).references(id);
    }

    builder
        .body(draft.body.clone())
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

#[async_trait]
impl MailSender for SmtpSender {
    async fn send(
        &self,
        draft: &ResponseDraft,
        recipient: &str,
        in_reply_to: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let email = build_message(&self.config.from_address, draft, recipient, in_reply_to)?;
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let transport = Self::transport(&config)?;
            transport
                .send(&email)
                .map_err(|e| DeliveryError::Transport(format!("SMTP send failed: {e}")))
        })
        .await
        .map_err(|e| DeliveryError::Transport(format!("SMTP task failed: {e}")))??;

        tracing::info!(recipient, subject = %draft.subject, "Reply sent");
        Ok(())
    }
}
