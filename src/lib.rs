//! newsletter - scheduled newsletter dispatch
//!
//! Polls a content store for items due around the current time and fans each
//! one out to the subscribers of its topic, either directly through a
//! notification transport or by handing it to a message broker.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Topics, subscribers and content items
//! - [`storage`] - Record stores (in-memory, SQLite)
//! - [`authoring`] - Creating records and answering status queries
//! - [`notifications`] - Notification transports (SMTP, webhook)
//! - [`dispatch`] - Dispatch strategies, subscriber fan-out and the send pool
//! - [`scheduler`] - Polling engine and trigger loop
//! - [`metrics`] - Prometheus metrics
//! - [`server`] - `/metrics` and `/health` endpoint
//! - [`error`] - Crate-level error and its classification
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use newsletter::config::Config;
//! use newsletter::dispatch::DispatchStrategy;
//! use newsletter::scheduler::{ContentDispatcher, PollTrigger, SchedulerStrategy};
//! use newsletter::storage::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = SqliteStore::new(&config.database.sqlite_path)?;
//!     let strategy = DispatchStrategy::from_config(&config, Arc::new(store.clone())).await?;
//!     let dispatcher = Arc::new(ContentDispatcher::new(Arc::new(store), strategy));
//!     let trigger = PollTrigger::new(dispatcher, SchedulerStrategy::from_config(&config.scheduler)?);
//!     trigger.start().await?;
//!     Ok(())
//! }
//! ```

pub mod authoring;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod server;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::authoring::{NewsletterService, StatusFilter};
    pub use crate::config::Config;
    pub use crate::dispatch::{ContentPublisher, DispatchKind, DispatchStrategy, WorkerPool};
    pub use crate::error::{Error, ErrorCategory, NewsletterErrorTrait, Result};
    pub use crate::models::{Content, ContentStatus, Subscriber, Topic};
    pub use crate::notifications::{NotificationTransport, TransportKind};
    pub use crate::scheduler::{ContentDispatcher, PollTrigger, SchedulerKind, SchedulerStrategy};
    pub use crate::storage::{ContentStore, SqliteStore, SubscriberStore, TopicStore};
}

// Direct re-exports for convenience
pub use models::{Content, ContentStatus, Subscriber, Topic};
