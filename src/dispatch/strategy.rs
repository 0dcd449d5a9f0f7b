//! How a due content item is handed off
//!
//! The strategy is chosen once at start-up from a configuration selector and
//! held immutably by the dispatcher.

use std::sync::Arc;

use crate::config::Config;
use crate::dispatch::broker::{MessageBroker, RedisBroker};
use crate::dispatch::pool::WorkerPool;
use crate::dispatch::publisher::ContentPublisher;
use crate::dispatch::DispatchError;
use crate::error;
use crate::models::Content;
use crate::notifications::{build_transport, NotificationTransport};
use crate::storage::SubscriberStore;

/// Default queue destination
pub const DEFAULT_DESTINATION: &str = "newsletter.send";

/// Resolved dispatch selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// In-process fan-out through the publisher (`scheduler`)
    Direct,
    /// Hand-off to the external broker (`kafka`)
    Queue,
}

impl DispatchKind {
    /// Parse a known selector (case-insensitive)
    pub fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.eq_ignore_ascii_case("kafka") {
            Some(Self::Queue)
        } else if selector.eq_ignore_ascii_case("scheduler") {
            Some(Self::Direct)
        } else {
            None
        }
    }

    /// Resolve a selector, falling back to [`DispatchKind::Direct`]
    pub fn select(selector: Option<&str>) -> Self {
        match selector {
            None => Self::Direct,
            Some(raw) => Self::parse(raw).unwrap_or_else(|| {
                tracing::warn!(selector = raw, "Unknown dispatch strategy, using direct dispatch");
                Self::Direct
            }),
        }
    }

    /// Selector name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "scheduler",
            Self::Queue => "kafka",
        }
    }
}

/// A constructed dispatch strategy
pub enum DispatchStrategy {
    /// Notify subscribers through the publisher and transport
    Direct {
        publisher: Arc<ContentPublisher>,
        transport: Arc<dyn NotificationTransport>,
    },
    /// Enqueue the item for an external consumer
    Queue {
        broker: Arc<dyn MessageBroker>,
        destination: String,
    },
}

impl DispatchStrategy {
    pub fn direct(publisher: Arc<ContentPublisher>, transport: Arc<dyn NotificationTransport>) -> Self {
        Self::Direct {
            publisher,
            transport,
        }
    }

    pub fn queue(broker: Arc<dyn MessageBroker>, destination: impl Into<String>) -> Self {
        Self::Queue {
            broker,
            destination: destination.into(),
        }
    }

    /// Build the configured strategy
    ///
    /// Only the selected variant's collaborators are constructed: direct
    /// dispatch never connects to the broker and queue dispatch never builds a
    /// transport or a pool.
    pub async fn from_config(config: &Config, subscribers: Arc<dyn SubscriberStore>) -> error::Result<Self> {
        let strategy = match DispatchKind::select(Some(config.dispatch.strategy.as_str())) {
            DispatchKind::Direct => {
                let transport = build_transport(&config.transport)?;
                let pool = WorkerPool::new(&config.pool)?;
                Self::direct(Arc::new(ContentPublisher::new(subscribers, pool)), transport)
            }
            DispatchKind::Queue => {
                let broker = RedisBroker::connect(&config.broker).await?;
                Self::queue(Arc::new(broker), config.broker.destination.clone())
            }
        };

        tracing::info!(strategy = strategy.kind().as_str(), "Dispatch strategy selected");
        Ok(strategy)
    }

    /// Which variant this is
    pub fn kind(&self) -> DispatchKind {
        match self {
            Self::Direct { .. } => DispatchKind::Direct,
            Self::Queue { .. } => DispatchKind::Queue,
        }
    }

    /// Transport used by direct dispatch
    pub fn transport(&self) -> Option<&Arc<dyn NotificationTransport>> {
        match self {
            Self::Direct { transport, .. } => Some(transport),
            Self::Queue { .. } => None,
        }
    }

    /// Hand off one content item
    ///
    /// Never mutates the item; the caller records the outcome.
    pub async fn dispatch(&self, content: &Content) -> Result<(), DispatchError> {
        match self {
            Self::Direct {
                publisher,
                transport,
            } => {
                publisher
                    .notify_subscribers(content, Arc::clone(transport))
                    .await
            }
            Self::Queue {
                broker,
                destination,
            } => {
                broker.enqueue(destination, content).await?;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for DispatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { transport, .. } => f
                .debug_struct("Direct")
                .field("transport", &transport.name())
                .finish(),
            Self::Queue { destination, .. } => f
                .debug_struct("Queue")
                .field("destination", destination)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::PoolError;
    use crate::error::{Error, ErrorCategory, NewsletterErrorTrait};
    use crate::storage::InMemorySubscriberStore;

    #[test]
    fn test_kafka_selects_queue() {
        assert_eq!(DispatchKind::select(Some("kafka")), DispatchKind::Queue);
        assert_eq!(DispatchKind::select(Some("KAFKA")), DispatchKind::Queue);
        assert_eq!(DispatchKind::select(Some("Kafka")), DispatchKind::Queue);
    }

    #[test]
    fn test_everything_else_selects_direct() {
        assert_eq!(DispatchKind::select(None), DispatchKind::Direct);
        assert_eq!(DispatchKind::select(Some("scheduler")), DispatchKind::Direct);
        assert_eq!(DispatchKind::select(Some("")), DispatchKind::Direct);
        assert_eq!(DispatchKind::select(Some("rabbitmq")), DispatchKind::Direct);
    }

    #[tokio::test]
    async fn test_from_config_unknown_transport() {
        let mut config = Config::default();
        config.transport.kind = "carrier-pigeon".to_string();

        let err = DispatchStrategy::from_config(&config, Arc::new(InMemorySubscriberStore::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[tokio::test]
    async fn test_from_config_bad_pool_sizing() {
        let mut config = Config::default();
        config.transport.kind = "webhook".to_string();
        config.transport.webhook_url = Some("http://127.0.0.1:9/deliver".to_string());
        config.pool.core_workers = 0;

        let err = DispatchStrategy::from_config(&config, Arc::new(InMemorySubscriberStore::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Pool(PoolError::InvalidConfig(_))));
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_from_config_direct_over_webhook() {
        let mut config = Config::default();
        config.dispatch.strategy = "SCHEDULER".to_string();
        config.transport.kind = "webhook".to_string();
        config.transport.webhook_url = Some("http://127.0.0.1:9/deliver".to_string());

        let strategy = DispatchStrategy::from_config(&config, Arc::new(InMemorySubscriberStore::new()))
            .await
            .unwrap();
        assert_eq!(strategy.kind(), DispatchKind::Direct);
        assert_eq!(format!("{strategy:?}"), "Direct { transport: \"webhook\" }");
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(DispatchKind::parse("rabbitmq"), None);
        assert_eq!(DispatchKind::parse("Scheduler"), Some(DispatchKind::Direct));
    }
}
