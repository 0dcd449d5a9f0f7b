//! Polling engine that moves due content out of `PENDING`
//!
//! ```text
//!            dispatch ok
//!   PENDING ────────────▶ SENT    (sent = true)
//!      │
//!      │     dispatch err
//!      └────────────────▶ FAILED  (sent = false)
//! ```
//!
//! Each poll looks at a window of ±30 seconds around the clock's current time.
//! Items are dispatched one after another; each outcome is saved exactly once.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::error::SchedulerResult;
use crate::dispatch::DispatchStrategy;
use crate::metrics;
use crate::models::ContentStatus;
use crate::storage::ContentStore;

/// Half-width of the poll window in seconds
pub const POLL_WINDOW_SECS: i64 = 30;

/// Inclusive poll window around `now`
pub fn poll_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let half = Duration::seconds(POLL_WINDOW_SECS);
    (now - half, now + half)
}

/// Outcome of one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Items returned by the pending query
    pub found: usize,
    /// Items moved to `SENT`
    pub sent: usize,
    /// Items moved to `FAILED`
    pub failed: usize,
    /// Items returned but not dispatchable
    pub skipped: usize,
    /// Outcomes that could not be persisted
    pub save_failures: usize,
}

impl PollReport {
    fn new(window_start: DateTime<Utc>, window_end: DateTime<Utc>, found: usize) -> Self {
        Self {
            window_start,
            window_end,
            found,
            sent: 0,
            failed: 0,
            skipped: 0,
            save_failures: 0,
        }
    }
}

/// Finds due content and records the result of dispatching it
pub struct ContentDispatcher {
    contents: Arc<dyn ContentStore>,
    strategy: DispatchStrategy,
    clock: Arc<dyn Clock>,
}

impl ContentDispatcher {
    /// Create a dispatcher using the system clock
    pub fn new(contents: Arc<dyn ContentStore>, strategy: DispatchStrategy) -> Self {
        Self {
            contents,
            strategy,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The dispatch strategy in use
    pub fn strategy(&self) -> &DispatchStrategy {
        &self.strategy
    }

    /// Run one poll
    ///
    /// Dispatch errors mark the item `FAILED` and the poll continues. A failed
    /// save is logged and counted and the poll continues. Only a failed
    /// pending query aborts the poll.
    pub async fn check_and_dispatch(&self) -> SchedulerResult<PollReport> {
        let started = Instant::now();
        let (window_start, window_end) = poll_window(self.clock.now());

        let items = match self
            .contents
            .find_pending(ContentStatus::Pending, window_start, window_end)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                metrics::record_poll_error();
                return Err(e.into());
            }
        };

        let mut report = PollReport::new(window_start, window_end, items.len());

        for mut content in items {
            if !content.is_dispatchable() {
                report.skipped += 1;
                continue;
            }

            let label = content.label();
            match self.strategy.dispatch(&content).await {
                Ok(()) => {
                    content.mark_sent();
                    report.sent += 1;
                    tracing::info!(content = %label, topic = %content.topic.name, "Content dispatched");
                }
                Err(e) => {
                    content.mark_failed();
                    report.failed += 1;
                    tracing::warn!(content = %label, error = %e, "Content dispatch failed");
                }
            }
            metrics::record_dispatch(content.status.as_str());

            if let Err(e) = self.contents.save(content).await {
                report.save_failures += 1;
                metrics::record_save_failure();
                tracing::error!(content = %label, error = %e, "Failed to persist dispatch outcome");
            }
        }

        metrics::record_poll(report.found, started.elapsed().as_secs_f64());
        tracing::debug!(
            found = report.found,
            sent = report.sent,
            failed = report.failed,
            "Poll complete"
        );

        Ok(report)
    }
}
