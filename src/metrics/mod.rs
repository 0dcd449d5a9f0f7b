//! Prometheus metrics for the dispatch scheduler
//!
//! This module provides metrics tracking for:
//! - Polls: runs, skipped firings, due items found, poll duration
//! - Dispatch: outcomes by resulting status, failed saves
//! - Fan-out: per-send outcomes, pool rejections, pool queue depth
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all scheduler metrics
struct SchedulerMetrics {
    polls: Counter,
    polls_skipped: Counter,
    poll_errors: Counter,
    poll_duration: Histogram,
    items_found: Counter,
    dispatches: CounterVec,
    save_failures: Counter,
    sends: CounterVec,
    pool_rejections: Counter,
    pool_queue_depth: Gauge,
}

/// Global storage for scheduler metrics
static SCHEDULER_METRICS: OnceLock<SchedulerMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = newsletter::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = SchedulerMetrics {
        polls: register_counter!(
            "newsletter_polls_total",
            "Total number of completed dispatch polls"
        )?,
        polls_skipped: register_counter!(
            "newsletter_polls_skipped_total",
            "Trigger firings skipped because a poll was still running"
        )?,
        poll_errors: register_counter!(
            "newsletter_poll_errors_total",
            "Polls aborted because the pending query failed"
        )?,
        poll_duration: register_histogram!(
            "newsletter_poll_duration_seconds",
            "Time spent in one dispatch poll",
            vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
        )?,
        items_found: register_counter!(
            "newsletter_items_found_total",
            "Pending content items returned by poll queries"
        )?,
        dispatches: register_counter_vec!(
            "newsletter_dispatches_total",
            "Dispatch outcomes by resulting content status",
            &["status"]
        )?,
        save_failures: register_counter!(
            "newsletter_save_failures_total",
            "Content status updates that could not be persisted"
        )?,
        sends: register_counter_vec!(
            "newsletter_sends_total",
            "Per-subscriber send attempts by outcome",
            &["outcome"]
        )?,
        pool_rejections: register_counter!(
            "newsletter_pool_rejections_total",
            "Send tasks rejected by the saturated worker pool"
        )?,
        pool_queue_depth: register_gauge!(
            "newsletter_pool_queue_depth",
            "Send tasks waiting in the worker pool queue"
        )?,
    };

    SCHEDULER_METRICS
        .set(metrics)
        .map_err(|_| "Scheduler metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCHEDULER_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a completed poll
pub fn record_poll(items_found: usize, duration_secs: f64) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    m.polls.inc();
    m.items_found.inc_by(items_found as f64);
    m.poll_duration.observe(duration_secs);
}

/// Record a trigger firing skipped by the single-flight guard
pub fn record_poll_skipped() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.polls_skipped.inc();
    }
}

/// Record a poll aborted by a query failure
pub fn record_poll_error() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.poll_errors.inc();
    }
}

/// Record the status a dispatched item ended in
pub fn record_dispatch(status: &str) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.dispatches.with_label_values(&[status]).inc();
    }
}

/// Record a failed status save
pub fn record_save_failure() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.save_failures.inc();
    }
}

/// Record one per-subscriber send attempt
pub fn record_send(success: bool) {
    let Some(m) = SCHEDULER_METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "failure" };
    m.sends.with_label_values(&[outcome]).inc();
}

/// Record a pool rejection
pub fn record_pool_rejection() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.pool_rejections.inc();
    }
}

/// Update the pool queue depth gauge
pub fn set_pool_queue_depth(depth: usize) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.pool_queue_depth.set(depth as f64);
    }
}

// ============================================================================
// Tests
// ============================================================================
