//! Poll cadence and the trigger loop
//!
//! Exactly one cadence is active per process: a fixed-rate interval or a cron
//! expression. Each firing spawns one poll; a firing that arrives while the
//! previous poll is still running is skipped.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::dispatcher::{ContentDispatcher, PollReport};
use super::error::{SchedulerError, SchedulerResult};
use crate::config::SchedulerConfig;
use crate::error::{self, NewsletterErrorTrait};
use crate::metrics;

// ============================================================================
// Strategy Selection
// ============================================================================

/// Resolved scheduler selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    FixedRate,
    Cron,
}

impl SchedulerKind {
    /// Parse a known selector (case-insensitive)
    pub fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if selector.eq_ignore_ascii_case("cron") {
            Some(Self::Cron)
        } else if selector.eq_ignore_ascii_case("fixedRate") {
            Some(Self::FixedRate)
        } else {
            None
        }
    }

    /// Resolve a selector, falling back to [`SchedulerKind::FixedRate`]
    pub fn select(selector: Option<&str>) -> Self {
        match selector {
            None => Self::FixedRate,
            Some(raw) => Self::parse(raw).unwrap_or_else(|| {
                tracing::warn!(selector = raw, "Unknown scheduler strategy, using fixed rate");
                Self::FixedRate
            }),
        }
    }
}

/// Poll cadence
#[derive(Debug, Clone)]
pub enum SchedulerStrategy {
    /// Constant interval, independent of how long a poll takes
    FixedRate { interval: std::time::Duration },
    /// Calendar expression, seconds first
    Cron {
        expression: String,
        schedule: cron::Schedule,
    },
}

impl SchedulerStrategy {
    pub fn fixed_rate(interval: std::time::Duration) -> SchedulerResult<Self> {
        if interval.is_zero() {
            return Err(SchedulerError::trigger_config(
                "fixed_rate_ms",
                "interval must be greater than 0",
            ));
        }
        Ok(Self::FixedRate { interval })
    }

    pub fn cron(expression: impl Into<String>) -> SchedulerResult<Self> {
        let expression = expression.into();
        let schedule = cron::Schedule::from_str(&expression)
            .map_err(|e| SchedulerError::invalid_cron(&expression, e.to_string()))?;
        Ok(Self::Cron {
            expression,
            schedule,
        })
    }

    /// Build the configured strategy; only the selected variant is constructed
    pub fn from_config(config: &SchedulerConfig) -> SchedulerResult<Self> {
        match SchedulerKind::select(Some(config.strategy.as_str())) {
            SchedulerKind::FixedRate => {
                Self::fixed_rate(config.fixed_rate())
            }
            SchedulerKind::Cron => Self::cron(config.cron.clone()),
        }
    }

    pub fn kind(&self) -> SchedulerKind {
        match self {
            Self::FixedRate { .. } => SchedulerKind::FixedRate,
            Self::Cron { .. } => SchedulerKind::Cron,
        }
    }

    /// Next firing strictly after `now`
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::FixedRate { interval } => chrono::Duration::from_std(*interval)
                .ok()
                .map(|d| now + d),
            Self::Cron { schedule, .. } => schedule.after(&now).next(),
        }
    }
}

impl fmt::Display for SchedulerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedRate { interval } => write!(f, "fixedRate({}ms)", interval.as_millis()),
            Self::Cron { expression, .. } => write!(f, "cron({expression})"),
        }
    }
}

// ============================================================================
// Poll Trigger
// ============================================================================

/// Clears the in-flight flag when a poll ends, including on panic
struct InFlightGuard {
    flag: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Drives [`ContentDispatcher::check_and_dispatch`] at the selected cadence
pub struct PollTrigger {
    dispatcher: Arc<ContentDispatcher>,
    strategy: SchedulerStrategy,
    in_flight: Arc<AtomicBool>,
    idle: Arc<Notify>,
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl PollTrigger {
    pub fn new(dispatcher: Arc<ContentDispatcher>, strategy: SchedulerStrategy) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            dispatcher,
            strategy,
            in_flight: Arc::new(AtomicBool::new(false)),
            idle: Arc::new(Notify::new()),
            running: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn strategy(&self) -> &SchedulerStrategy {
        &self.strategy
    }

    pub fn dispatcher(&self) -> &Arc<ContentDispatcher> {
        &self.dispatcher
    }

    /// Whether a poll is currently running
    pub fn is_polling(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the trigger loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start one poll unless one is already running
    ///
    /// Returns `None` when the firing was skipped. The handle resolves to the
    /// poll outcome, which has already been logged.
    pub fn fire(&self) -> Option<JoinHandle<error::Result<PollReport>>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            metrics::record_poll_skipped();
            tracing::warn!("Previous poll still running, skipping this firing");
            return None;
        }

        let guard = InFlightGuard {
            flag: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };
        let dispatcher = Arc::clone(&self.dispatcher);

        Some(tokio::spawn(async move {
            let _guard = guard;
            let outcome = dispatcher.check_and_dispatch().await.map_err(error::Error::from);
            match &outcome {
                Ok(report) if report.found > 0 => {
                    tracing::info!(
                        found = report.found,
                        sent = report.sent,
                        failed = report.failed,
                        "Dispatch poll finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        category = %e.category(),
                        recoverable = e.is_recoverable(),
                        "Dispatch poll failed"
                    );
                }
            }
            outcome
        }))
    }

    /// Run the trigger loop until [`PollTrigger::stop`] is called
    ///
    /// A stopped trigger can be started again.
    pub async fn start(&self) -> SchedulerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let mut shutdown = self.shutdown.subscribe();
        tracing::info!(strategy = %self.strategy, "Poll trigger started");

        let result = match &self.strategy {
            SchedulerStrategy::FixedRate { interval } => {
                let mut ticker = tokio::time::interval(*interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                while !*shutdown.borrow() {
                    tokio::select! {
                        _ = ticker.tick() => {
                            self.fire();
                        }
                        _ = shutdown.changed() => {}
                    }
                }
                Ok(())
            }
            SchedulerStrategy::Cron { expression, .. } => {
                let mut outcome = Ok(());
                while !*shutdown.borrow() {
                    let now = Utc::now();
                    let Some(next) = self.strategy.next_fire_after(now) else {
                        outcome = Err(SchedulerError::ScheduleExhausted {
                            expression: expression.clone(),
                        });
                        break;
                    };
                    let delay = (next - now).to_std().unwrap_or_default();
                    tracing::debug!(next = %next, "Waiting for next cron firing");

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            self.fire();
                        }
                        _ = shutdown.changed() => {}
                    }
                }
                outcome
            }
        };

        // Re-arm for the next start
        self.shutdown.send_replace(false);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Poll trigger stopped");
        result
    }

    /// Stop the trigger loop; a running poll is left to finish
    ///
    /// A stop requested while no loop runs makes the next `start` return at
    /// once.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Wait until no poll is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_polling() {
                return;
            }
            notified.await;
        }
    }
}
