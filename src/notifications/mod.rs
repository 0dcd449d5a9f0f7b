//! Notification transports for delivering newsletter messages
//!
//! A transport sends exactly one message to one recipient. The publisher owns
//! fan-out and failure handling; transports only report what happened.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      ContentPublisher                      │
//! │  - one send task per subscriber            │
//! └────────────────────────────────────────────┘
//!                     │
//!           ┌─────────┴─────────┐
//!           ▼                   ▼
//!   ┌──────────────┐    ┌──────────────┐
//!   │    Email     │    │   Webhook    │
//!   │ (SMTP relay) │    │ (HTTP POST)  │
//!   └──────────────┘    └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use newsletter::notifications::build_transport;
//!
//! let transport = build_transport(&config.transport)?;
//! transport.send("reader@example.com", "Newsletter: rust", "body").await?;
//! ```

pub mod channels;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::TransportConfig;

pub use channels::email::{EmailTransport, SmtpSettings};
pub use channels::webhook::{WebhookConfig, WebhookTransport};

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// SMTP dialogue failed
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// Message could not be assembled
    #[error("Message build error: {0}")]
    Message(#[from] lettre::error::Error),

    /// Recipient or sender address is malformed
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Invalid transport configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Remote endpoint refused the message
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Check if a later attempt may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Smtp(e) => e.is_transient(),
            Self::Rejected(_) => true,
            _ => false,
        }
    }
}

/// Receipt for a delivered notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Transport that delivered the notification
    pub transport: String,
    /// Recipient address
    pub recipient: String,
    /// Optional message from the remote side
    pub message: Option<String>,
    /// Timestamp of delivery
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    /// Create a delivery receipt
    pub fn delivered(transport: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            recipient: recipient.into(),
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach a remote message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.transport, self.recipient)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Sends one message to one recipient
///
/// Implement this trait to add a delivery mechanism.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Get the transport name
    fn name(&self) -> &str;

    /// Deliver a single message
    async fn send(&self, recipient: &str, subject: &str, body: &str)
        -> TransportResult<DeliveryStatus>;

    /// Check if the transport is reachable
    async fn health_check(&self) -> TransportResult<bool> {
        Ok(true)
    }
}

/// Supported transport selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Gmail,
    Webhook,
}

impl TransportKind {
    /// Parse a selector (case-insensitive)
    pub fn parse(selector: &str) -> Option<Self> {
        match selector.trim().to_ascii_lowercase().as_str() {
            "gmail" => Some(Self::Gmail),
            "webhook" => Some(Self::Webhook),
            _ => None,
        }
    }
}

/// Validate and normalise an email address
pub fn validate_address(address: &str) -> TransportResult<lettre::Address> {
    address
        .trim()
        .parse::<lettre::Address>()
        .map_err(|e| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the configured transport
///
/// Unlike the strategy selectors there is no fallback here: an unsupported
/// transport is a configuration error.
pub fn build_transport(config: &TransportConfig) -> TransportResult<Arc<dyn NotificationTransport>> {
    let timeout = config.timeout();

    match TransportKind::parse(&config.kind) {
        Some(TransportKind::Gmail) => {
            let settings = SmtpSettings {
                name: "gmail".to_string(),
                host: config.smtp_host.clone(),
                port: config.smtp_port,
                from: config.from.clone(),
                username: config.username.clone().unwrap_or_else(|| config.from.clone()),
                password: config.password.clone().unwrap_or_default(),
                timeout,
            };
            Ok(Arc::new(EmailTransport::new(settings)?))
        }
        Some(TransportKind::Webhook) => {
            let url = config.webhook_url.clone().ok_or_else(|| {
                TransportError::InvalidConfig("webhook transport requires webhook_url".to_string())
            })?;
            let mut webhook = WebhookConfig::new(url)
                .with_timeout(config.timeout_secs)
                .with_max_retries(config.max_retries);
            if let Some(token) = &config.webhook_auth_token {
                webhook = webhook.with_auth_token(token.clone());
            }
            Ok(Arc::new(WebhookTransport::new(webhook)?))
        }
        None => Err(TransportError::InvalidConfig(format!(
            "unsupported transport '{}'",
            config.kind
        ))),
    }
}
