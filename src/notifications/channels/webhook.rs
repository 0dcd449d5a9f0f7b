//! Webhook notification transport
//!
//! Delivers each message as a JSON payload via HTTP POST, for mail gateways
//! that expose an HTTP ingestion endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::notifications::{DeliveryStatus, NotificationTransport, TransportError, TransportResult};

/// Webhook transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Base delay between retries in milliseconds (doubles per attempt)
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    2
}

fn default_backoff() -> u64 {
    500
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: std::collections::HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            backoff_ms: default_backoff(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set retry backoff base
    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Webhook notification transport
///
/// # Payload Format
///
/// ```json
/// {
///   "recipient": "reader@example.com",
///   "subject": "Newsletter: rust",
///   "body": "This week in Rust...",
///   "sent_at": "2024-01-01T12:00:00Z"
/// }
/// ```
pub struct WebhookTransport {
    config: WebhookConfig,
    client: Client,
}

/// Upper bound on a single retry delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff before retry `attempt` (1-based), capped at [`MAX_RETRY_DELAY`]
fn retry_delay(backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.checked_pow(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_millis(backoff_ms.saturating_mul(factor)).min(MAX_RETRY_DELAY)
}

impl WebhookTransport {
    /// Create a new webhook transport
    pub fn new(config: WebhookConfig) -> TransportResult<Self> {
        config.validate().map_err(TransportError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Create a webhook transport with just a URL
    pub fn from_url(url: impl Into<String>) -> TransportResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, recipient: &str, subject: &str, body: &str) -> serde_json::Value {
        serde_json::json!({
            "recipient": recipient,
            "subject": subject,
            "body": body,
            "sent_at": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Send the request with retry logic, returning the final HTTP status
    async fn send_with_retry(&self, payload: &serde_json::Value) -> TransportResult<u16> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(self.config.backoff_ms, attempt)).await;
                tracing::debug!(
                    "Retrying webhook request (attempt {}/{})",
                    attempt + 1,
                    self.config.max_retries + 1
                );
            }

            let mut request = self.client.post(&self.config.url);

            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }

            match request.json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(status.as_u16());
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unable to read response body".to_string());
                    last_error = Some(TransportError::Rejected(format!("HTTP {status}: {body}")));

                    // Client errors will not change on retry
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(TransportError::Http(e));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| TransportError::Rejected("no attempt was made".to_string())))
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, recipient: &str, subject: &str, body: &str) -> TransportResult<DeliveryStatus> {
        let payload = self.build_payload(recipient, subject, body);
        let status = self.send_with_retry(&payload).await?;

        tracing::debug!(recipient, url = %self.config.url, status, "Webhook delivered");
        Ok(DeliveryStatus::delivered("webhook", recipient).with_message(format!("HTTP {status}")))
    }

    async fn health_check(&self) -> TransportResult<bool> {
        match self.client.head(&self.config.url).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Webhook health check failed for {}: {}", self.config.url, e);
                Ok(false)
            }
        }
    }
}
