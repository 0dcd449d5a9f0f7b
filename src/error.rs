//! Crate-level error
//!
//! Stores, transports, the broker, the pool and the scheduler each raise
//! their own error enum. [`Error`] is what crosses module boundaries: the
//! strategy factory returns it and every poll fired by the trigger resolves to
//! it. [`NewsletterErrorTrait`] classifies it for logging and retry decisions.

use std::fmt;

use crate::dispatch::{BrokerError, DispatchError, PoolError};
use crate::notifications::TransportError;
use crate::scheduler::SchedulerError;
use crate::storage::StoreError;

/// Classification shared by crate errors
pub trait NewsletterErrorTrait: std::error::Error {
    /// Whether a later attempt may succeed
    fn is_recoverable(&self) -> bool;

    fn category(&self) -> ErrorCategory;
}

/// Which part of the system an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Storage,
    Transport,
    Broker,
    Dispatch,
    /// Rejected at start-up: bad selector, sizing or cron expression
    Config,
    Scheduler,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Transport => "transport",
            Self::Broker => "broker",
            Self::Dispatch => "dispatch",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Scheduler error: {0}")]
    Scheduler(SchedulerError),
}

/// An aborted poll is a store failure; the scheduler wrapper is dropped
impl From<SchedulerError> for Error {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::PollFailed { source } => Self::Store(source),
            other => Self::Scheduler(other),
        }
    }
}

impl NewsletterErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_recoverable(),
            Self::Transport(e) => e.is_recoverable(),
            Self::Broker(e) => e.is_recoverable(),
            Self::Pool(e) => matches!(e, PoolError::Saturated { .. }),
            Self::Dispatch(DispatchError::Broker(e)) => e.is_recoverable(),
            Self::Dispatch(DispatchError::Store(e)) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Store(_) => ErrorCategory::Storage,
            Self::Transport(TransportError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Broker(_) | Self::Dispatch(DispatchError::Broker(_)) => ErrorCategory::Broker,
            Self::Dispatch(DispatchError::Store(_)) => ErrorCategory::Storage,
            Self::Pool(PoolError::InvalidConfig(_)) => ErrorCategory::Config,
            Self::Pool(_) => ErrorCategory::Dispatch,
            Self::Scheduler(
                SchedulerError::InvalidCron { .. } | SchedulerError::TriggerConfigError { .. },
            ) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborted_poll_is_a_store_error() {
        let err: Error = SchedulerError::PollFailed {
            source: StoreError::Task("query timed out".to_string()),
        }
        .into();

        assert!(matches!(err, Error::Store(StoreError::Task(_))));
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_startup_errors_are_config() {
        let cron: Error = SchedulerError::invalid_cron("* *", "too short").into();
        assert_eq!(cron.category(), ErrorCategory::Config);
        assert!(!cron.is_recoverable());

        let pool: Error = PoolError::InvalidConfig("core_workers".to_string()).into();
        assert_eq!(pool.category(), ErrorCategory::Config);

        let transport: Error = TransportError::InvalidConfig("unknown transport".into()).into();
        assert_eq!(transport.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_saturation_is_recoverable() {
        let saturated = Error::Pool(PoolError::Saturated {
            queue_capacity: 50,
            max_workers: 10,
        });
        assert!(saturated.is_recoverable());
        assert_eq!(saturated.category(), ErrorCategory::Dispatch);
    }

    #[test]
    fn test_already_running_stays_scheduler() {
        let err: Error = SchedulerError::AlreadyRunning.into();
        assert_eq!(err.category(), ErrorCategory::Scheduler);
        assert_eq!(err.to_string(), "Scheduler error: Trigger loop is already running");
    }
}
