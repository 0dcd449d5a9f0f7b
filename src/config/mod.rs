//! Configuration management for the newsletter scheduler
//!
//! Configuration is resolved once at process start, either from `NEWSLETTER_*`
//! environment variables or from a TOML file, and then validated. Missing TOML
//! sections fall back to their defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::dispatch::DispatchKind;
use crate::notifications::{validate_address, TransportKind};
use crate::scheduler::SchedulerKind;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatch strategy selection
    pub dispatch: DispatchConfig,

    /// Poll cadence
    pub scheduler: SchedulerConfig,

    /// Send worker pool sizing
    pub pool: PoolConfig,

    /// Notification transport
    pub transport: TransportConfig,

    /// External broker used by the queue strategy
    pub broker: BrokerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Metrics endpoint
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Dispatch strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// `scheduler` (direct fan-out) or `kafka` (queue hand-off)
    pub strategy: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: String::from("scheduler"),
        }
    }
}

/// Scheduler strategy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `fixedRate` or `cron`
    pub strategy: String,

    /// Fixed-rate interval in milliseconds
    pub fixed_rate_ms: u64,

    /// Cron expression (seconds first, six fields)
    pub cron: String,

    /// Reject unknown dispatch/scheduler selectors instead of falling back
    pub strict_selectors: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: String::from("fixedRate"),
            fixed_rate_ms: 10_000,
            cron: String::from("0 */5 * * * *"),
            strict_selectors: false,
        }
    }
}

impl SchedulerConfig {
    /// Fixed-rate interval as Duration
    #[must_use]
    pub fn fixed_rate(&self) -> Duration {
        Duration::from_millis(self.fixed_rate_ms)
    }
}

/// Send worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers that live for the whole process
    pub core_workers: usize,

    /// Upper bound on workers, including burst workers
    pub max_workers: usize,

    /// Pending send tasks admitted before burst workers are started
    pub queue_capacity: usize,

    /// Prefix used to name worker tasks in logs
    pub worker_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 5,
            max_workers: 10,
            queue_capacity: 50,
            worker_name_prefix: String::from("dispatcher-"),
        }
    }
}

/// Notification transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// `gmail` or `webhook`
    pub kind: String,

    /// Sender address for email transports
    pub from: String,

    /// SMTP relay host
    pub smtp_host: String,

    /// SMTP port override
    pub smtp_port: Option<u16>,

    /// SMTP username (defaults to `from`)
    pub username: Option<String>,

    /// SMTP password or app password
    pub password: Option<String>,

    /// Webhook endpoint for the webhook transport
    pub webhook_url: Option<String>,

    /// Bearer token sent to the webhook
    pub webhook_auth_token: Option<String>,

    /// Per-send timeout in seconds
    pub timeout_secs: u64,

    /// Webhook retry attempts
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: String::from("gmail"),
            from: String::from("newsletter@example.com"),
            smtp_host: String::from("smtp.gmail.com"),
            smtp_port: None,
            username: None,
            password: None,
            webhook_url: None,
            webhook_auth_token: None,
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

impl TransportConfig {
    /// Per-send timeout as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream the queue strategy publishes to
    pub destination: String,

    /// Maximum pool size
    pub pool_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: String::from("redis://127.0.0.1:6379"),
            destination: String::from(crate::dispatch::DEFAULT_DESTINATION),
            pool_size: 8,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/newsletter.db"),
        }
    }
}

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve `/metrics` and `/health` while running
    pub enabled: bool,

    /// Listen address
    pub bind_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: String::from("0.0.0.0:9090"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl LoggingConfig {
    /// Whether records are written as JSON lines
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    /// `EnvFilter` directive for this crate; `verbose` forces debug
    pub fn filter_directive(&self, verbose: bool) -> String {
        let level = if verbose {
            "debug".to_string()
        } else {
            self.level.to_ascii_lowercase()
        };
        format!("newsletter={level},warn")
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let dispatch = DispatchConfig {
            strategy: env_string("NEWSLETTER_DISPATCH_STRATEGY", &defaults.dispatch.strategy),
        };

        let scheduler = SchedulerConfig {
            strategy: env_string("NEWSLETTER_SCHEDULER_STRATEGY", &defaults.scheduler.strategy),
            fixed_rate_ms: env_parsed("NEWSLETTER_FIXED_RATE_MS", defaults.scheduler.fixed_rate_ms),
            cron: env_string("NEWSLETTER_CRON", &defaults.scheduler.cron),
            strict_selectors: env_parsed("NEWSLETTER_STRICT_SELECTORS", false),
        };

        let pool = PoolConfig {
            core_workers: env_parsed("NEWSLETTER_POOL_CORE_WORKERS", defaults.pool.core_workers),
            max_workers: env_parsed("NEWSLETTER_POOL_MAX_WORKERS", defaults.pool.max_workers),
            queue_capacity: env_parsed(
                "NEWSLETTER_POOL_QUEUE_CAPACITY",
                defaults.pool.queue_capacity,
            ),
            worker_name_prefix: defaults.pool.worker_name_prefix,
        };

        let transport = TransportConfig {
            kind: env_string("NEWSLETTER_TRANSPORT", &defaults.transport.kind),
            from: env_string("NEWSLETTER_MAIL_FROM", &defaults.transport.from),
            smtp_host: env_string("NEWSLETTER_SMTP_HOST", &defaults.transport.smtp_host),
            smtp_port: std::env::var("NEWSLETTER_SMTP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok()),
            username: std::env::var("NEWSLETTER_SMTP_USERNAME").ok(),
            password: std::env::var("NEWSLETTER_SMTP_PASSWORD").ok(),
            webhook_url: std::env::var("NEWSLETTER_WEBHOOK_URL").ok(),
            webhook_auth_token: std::env::var("NEWSLETTER_WEBHOOK_TOKEN").ok(),
            timeout_secs: env_parsed("NEWSLETTER_TRANSPORT_TIMEOUT", defaults.transport.timeout_secs),
            max_retries: env_parsed("NEWSLETTER_TRANSPORT_RETRIES", defaults.transport.max_retries),
        };

        let broker = BrokerConfig {
            redis_url: std::env::var("NEWSLETTER_REDIS_URL")
                .or_else(|_| std::env::var("REDIS_URL"))
                .unwrap_or(defaults.broker.redis_url),
            destination: env_string("NEWSLETTER_BROKER_DESTINATION", &defaults.broker.destination),
            pool_size: env_parsed("NEWSLETTER_BROKER_POOL_SIZE", defaults.broker.pool_size),
        };

        let database = DatabaseConfig {
            sqlite_path: std::env::var("NEWSLETTER_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database.sqlite_path),
        };

        let metrics = MetricsConfig {
            enabled: env_parsed("NEWSLETTER_METRICS_ENABLED", defaults.metrics.enabled),
            bind_addr: env_string("NEWSLETTER_METRICS_ADDR", &defaults.metrics.bind_addr),
        };

        let logging = LoggingConfig {
            level: env_string("NEWSLETTER_LOG_LEVEL", &defaults.logging.level),
            format: env_string("NEWSLETTER_LOG_FORMAT", &defaults.logging.format),
        };

        Ok(Self {
            dispatch,
            scheduler,
            pool,
            transport,
            broker,
            database,
            metrics,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.strict_selectors {
            if DispatchKind::parse(&self.dispatch.strategy).is_none() {
                anyhow::bail!("unknown dispatch strategy '{}'", self.dispatch.strategy);
            }
            if SchedulerKind::parse(&self.scheduler.strategy).is_none() {
                anyhow::bail!("unknown scheduler strategy '{}'", self.scheduler.strategy);
            }
        }

        if self.scheduler.fixed_rate_ms == 0 {
            anyhow::bail!("fixed_rate_ms must be greater than 0");
        }

        cron::Schedule::from_str(&self.scheduler.cron)
            .with_context(|| format!("invalid cron expression '{}'", self.scheduler.cron))?;

        if self.pool.core_workers == 0 {
            anyhow::bail!("core_workers must be greater than 0");
        }

        if self.pool.max_workers < self.pool.core_workers {
            anyhow::bail!("max_workers must be at least core_workers");
        }

        if self.pool.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        match TransportKind::parse(&self.transport.kind) {
            Some(TransportKind::Gmail) => {
                validate_address(&self.transport.from)
                    .with_context(|| format!("invalid from address '{}'", self.transport.from))?;
            }
            Some(TransportKind::Webhook) => {
                if self.transport.webhook_url.is_none() {
                    anyhow::bail!("webhook transport requires webhook_url");
                }
            }
            None => anyhow::bail!("unsupported transport '{}'", self.transport.kind),
        }

        if self.transport.timeout_secs == 0 {
            anyhow::bail!("transport timeout must be greater than 0");
        }

        if self.broker.destination.trim().is_empty() {
            anyhow::bail!("broker destination cannot be empty");
        }

        if self.broker.pool_size == 0 {
            anyhow::bail!("broker pool_size must be greater than 0");
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            anyhow::bail!("unknown log level '{}'", self.logging.level);
        }

        if !self.is_known_log_format() {
            anyhow::bail!("unknown log format '{}' (expected text or json)", self.logging.format);
        }

        Ok(())
    }

    fn is_known_log_format(&self) -> bool {
        self.logging.is_json() || self.logging.format.eq_ignore_ascii_case("text")
    }
}
