//! SMTP email transport
//!
//! Sends plain-text messages through an authenticated STARTTLS relay. The
//! default relay is Gmail; the sender address comes from configuration.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::notifications::{
    validate_address, DeliveryStatus, NotificationTransport, TransportResult,
};

/// Connection settings for an SMTP relay
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    /// Name reported in logs and receipts
    pub name: String,
    /// Relay host
    pub host: String,
    /// Port override (STARTTLS default 587)
    pub port: Option<u16>,
    /// Sender address
    pub from: String,
    /// Login user
    pub username: String,
    /// Login password; empty disables authentication
    pub password: String,
    /// Command timeout
    pub timeout: Duration,
}

/// Email transport backed by a pooled async SMTP connection
///
/// # Example
///
/// ```rust,ignore
/// use newsletter::notifications::{EmailTransport, SmtpSettings};
///
/// let transport = EmailTransport::new(settings)?;
/// transport.send("reader@example.com", "Newsletter: rust", "Hello").await?;
/// ```
pub struct EmailTransport {
    name: String,
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailTransport {
    /// Create a transport; no connection is opened until the first send
    pub fn new(settings: SmtpSettings) -> TransportResult<Self> {
        let from = Mailbox::new(None, validate_address(&settings.from)?);

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .timeout(Some(settings.timeout));

        if let Some(port) = settings.port {
            builder = builder.port(port);
        }

        if !settings.password.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ));
        }

        tracing::debug!(relay = %settings.host, from = %from, "SMTP transport configured");

        Ok(Self {
            name: settings.name,
            from,
            mailer: builder.build(),
        })
    }

    fn build_message(&self, recipient: &str, subject: &str, body: &str) -> TransportResult<Message> {
        let to = Mailbox::new(None, validate_address(recipient)?);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        Ok(message)
    }
}

#[async_trait]
impl NotificationTransport for EmailTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> TransportResult<DeliveryStatus> {
        let message = self.build_message(recipient, subject, body)?;
        let response = self.mailer.send(message).await?;

        tracing::debug!(recipient, code = %response.code(), "Email accepted by relay");
        Ok(DeliveryStatus::delivered(self.name.clone(), recipient)
            .with_message(response.code().to_string()))
    }

    async fn health_check(&self) -> TransportResult<bool> {
        match self.mailer.test_connection().await {
            Ok(ok) => Ok(ok),
            Err(e) => {
                tracing::warn!(transport = %self.name, error = %e, "SMTP health check failed");
                Ok(false)
            }
        }
    }
}
