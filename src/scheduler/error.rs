//! Error types for the scheduler module

use std::fmt;

use crate::storage::StoreError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Cron expression could not be parsed
    InvalidCron { expression: String, reason: String },

    /// Trigger configuration error
    TriggerConfigError { field: String, reason: String },

    /// Cron schedule has no upcoming firing
    ScheduleExhausted { expression: String },

    /// Pending query failed, aborting the poll
    PollFailed { source: StoreError },

    /// Trigger loop already started
    AlreadyRunning,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCron { expression, reason } => {
                write!(f, "Invalid cron expression '{}': {}", expression, reason)
            }
            Self::TriggerConfigError { field, reason } => {
                write!(f, "Trigger config error in '{}': {}", field, reason)
            }
            Self::ScheduleExhausted { expression } => {
                write!(f, "Cron expression '{}' has no upcoming firing", expression)
            }
            Self::PollFailed { source } => {
                write!(f, "Poll failed: {}", source)
            }
            Self::AlreadyRunning => write!(f, "Trigger loop is already running"),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PollFailed { source } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for SchedulerError {
    fn from(err: StoreError) -> Self {
        Self::PollFailed { source: err }
    }
}

impl SchedulerError {
    /// Create an invalid cron error
    pub fn invalid_cron(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    /// Create a trigger config error
    pub fn trigger_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerConfigError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::PollFailed { source } => source.is_recoverable(),
            _ => false,
        }
    }
}
