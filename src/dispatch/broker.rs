//! External message broker used by the queue dispatch strategy
//!
//! The broker only has to accept the content item under a named destination;
//! whatever consumes the destination is responsible for delivery.
//!
//! # Example
//!
//! ```rust,ignore
//! use newsletter::dispatch::{MessageBroker, RedisBroker};
//!
//! let broker = RedisBroker::connect(&config.broker).await?;
//! broker.enqueue("newsletter.send", &content).await?;
//! ```

use async_trait::async_trait;
use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};

use crate::config::BrokerConfig;
use crate::models::Content;

/// Errors raised while handing content to a broker
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Could not obtain a broker connection
    #[error("Broker connection error: {0}")]
    Connection(String),

    /// Broker refused the command
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Content could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker accepted the connection but rejected the message
    #[error("Enqueue rejected: {0}")]
    Rejected(String),
}

impl BrokerError {
    /// Encoding failures will fail again; everything else may be transient
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Serialization(_))
    }
}

impl From<deadpool_redis::PoolError> for BrokerError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Accepts content items for asynchronous delivery
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Hand `content` to the broker under `destination`
    async fn enqueue(&self, destination: &str, content: &Content) -> Result<(), BrokerError>;
}

/// Redis stream broker
///
/// Each item is appended as `XADD <destination> * content <json>`.
pub struct RedisBroker {
    pool: Pool,
}

impl RedisBroker {
    /// Create a pooled broker and verify the connection
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let pool = RedisPoolConfig::from_url(&config.redis_url)
            .builder()
            .map_err(|e| BrokerError::Connection(format!("Failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| BrokerError::Connection(format!("Failed to create Redis pool: {e}")))?;

        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %config.redis_url, "Connected to Redis broker");
        Ok(Self { pool })
    }
}

/// Encode a content item as the broker message body
pub fn encode_message(content: &Content) -> Result<String, BrokerError> {
    Ok(serde_json::to_string(content)?)
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn enqueue(&self, destination: &str, content: &Content) -> Result<(), BrokerError> {
        let payload = encode_message(content)?;
        let mut conn = self.pool.get().await?;

        let entry_id: String = redis::cmd("XADD")
            .arg(destination)
            .arg("*")
            .arg("content")
            .arg(&payload)
            .query_async(&mut *conn)
            .await?;

        tracing::debug!(destination, entry_id = %entry_id, content = %content.label(), "Content enqueued");
        Ok(())
    }
}
