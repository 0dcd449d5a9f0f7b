//! Content hand-off: strategies, subscriber fan-out and the send worker pool
//!
//! ```text
//!             DispatchStrategy::dispatch(content)
//!                 │                         │
//!          Direct │                         │ Queue
//!                 ▼                         ▼
//!        ContentPublisher            MessageBroker::enqueue
//!                 │                  ("newsletter.send")
//!                 ▼
//!   WorkerPool (5 core, 10 max, queue 50)
//!                 │
//!                 ▼
//!   NotificationTransport::send  × subscribers
//! ```

pub mod broker;
pub mod pool;
pub mod publisher;
pub mod strategy;

pub use broker::{BrokerError, MessageBroker, RedisBroker};
pub use pool::{PoolError, PoolStatsSnapshot, WorkerPool};
pub use publisher::ContentPublisher;
pub use strategy::{DispatchKind, DispatchStrategy, DEFAULT_DESTINATION};

use crate::storage::StoreError;

/// Errors raised by a dispatch strategy
///
/// The dispatcher turns any of these into a `FAILED` status.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Broker refused the hand-off
    #[error("Broker hand-off failed: {0}")]
    Broker(#[from] BrokerError),

    /// Subscriber lookup failed
    #[error("Subscriber lookup failed: {0}")]
    Store(#[from] StoreError),
}
