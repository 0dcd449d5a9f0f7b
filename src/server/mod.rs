//! Metrics and health endpoint
//!
//! A small axum server that runs next to the trigger loop:
//!
//! - `GET /health` - liveness, trigger state and transport reachability
//! - `GET /metrics` - Prometheus text exposition

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::config::MetricsConfig;
use crate::metrics;
use crate::scheduler::PollTrigger;

// ============================================================================
// App State
// ============================================================================

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// Trigger whose state `/health` reports, if one is running
    pub trigger: Option<Arc<PollTrigger>>,

    /// Server start time
    pub start_time: Instant,
}

/// `/health` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub trigger_running: bool,
    pub poll_in_flight: bool,
    pub strategy: Option<String>,
    /// Transport used by direct dispatch
    pub transport: Option<String>,
    /// `None` when no transport is in use
    pub transport_reachable: Option<bool>,
}

// ============================================================================
// Server
// ============================================================================

/// HTTP server exposing `/metrics` and `/health`
pub struct MetricsServer {
    bind_address: SocketAddr,
    state: AppState,
}

impl MetricsServer {
    pub fn new(
        config: &MetricsConfig,
        trigger: Option<Arc<PollTrigger>>,
    ) -> Result<Self, ServerError> {
        let bind_address = config
            .bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| ServerError::ConfigError(format!("{}: {e}", config.bind_addr)))?;

        Ok(Self {
            bind_address,
            state: AppState {
                trigger,
                start_time: Instant::now(),
            },
        })
    }

    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown_signal` resolves
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        tracing::info!(addr = %self.bind_address, "Metrics server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Metrics server shutdown complete");
        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let (trigger_running, poll_in_flight, strategy) = match &state.trigger {
        Some(trigger) => (
            trigger.is_running(),
            trigger.is_polling(),
            Some(trigger.strategy().to_string()),
        ),
        None => (false, false, None),
    };

    let transport = state
        .trigger
        .as_ref()
        .and_then(|trigger| trigger.dispatcher().strategy().transport().cloned());

    let (transport_name, transport_reachable) = match transport {
        Some(transport) => {
            let reachable = transport.health_check().await.unwrap_or_else(|e| {
                tracing::warn!(transport = transport.name(), error = %e, "Transport health check failed");
                false
            });
            (Some(transport.name().to_string()), Some(reachable))
        }
        None => (None, None),
    };

    let status = if transport_reachable == Some(false) {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        trigger_running,
        poll_in_flight,
        strategy,
        transport: transport_name,
        transport_reachable,
    })
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
        }
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to bind to address
    #[error("Failed to bind: {0}")]
    BindError(String),

    /// Server error
    #[error("Server error: {0}")]
    ServeError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::PoolConfig;
    use crate::dispatch::{ContentPublisher, DispatchStrategy, WorkerPool};
    use crate::notifications::{DeliveryStatus, NotificationTransport, TransportError, TransportResult};
    use crate::scheduler::{ContentDispatcher, SchedulerStrategy};
    use crate::storage::{InMemoryContentStore, InMemorySubscriberStore};

    #[test]
    fn test_invalid_bind_address() {
        let config = MetricsConfig {
            enabled: true,
            bind_addr: "not-an-address".to_string(),
        };
        let err = MetricsServer::new(&config, None).err().unwrap();
        assert!(matches!(err, ServerError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_health_without_trigger() {
        let config = MetricsConfig {
            enabled: true,
            bind_addr: "127.0.0.1:0".to_string(),
        };
        let server = MetricsServer::new(&config, None).unwrap();
        let Json(health) = health_check(State(server.state.clone())).await;

        assert_eq!(health.status, "healthy");
        assert!(!health.trigger_running);
        assert!(health.strategy.is_none());
        assert!(health.transport_reachable.is_none());
    }

    struct UnreachableTransport;

    #[async_trait]
    impl NotificationTransport for UnreachableTransport {
        fn name(&self) -> &str {
            "unreachable"
        }

        async fn send(
            &self,
            _recipient: &str,
            _subject: &str,
            _body: &str,
        ) -> TransportResult<DeliveryStatus> {
            Err(TransportError::Rejected("relay down".to_string()))
        }

        async fn health_check(&self) -> TransportResult<bool> {
            Ok(false)
        }
    }

    fn trigger_with(strategy: DispatchStrategy) -> Arc<PollTrigger> {
        let dispatcher = ContentDispatcher::new(Arc::new(InMemoryContentStore::new()), strategy);
        Arc::new(PollTrigger::new(
            Arc::new(dispatcher),
            SchedulerStrategy::fixed_rate(Duration::from_secs(10)).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_health_reports_unreachable_transport() {
        let pool = WorkerPool::new(&PoolConfig::default()).unwrap();
        let publisher = Arc::new(ContentPublisher::new(
            Arc::new(InMemorySubscriberStore::new()),
            pool,
        ));
        let trigger = trigger_with(DispatchStrategy::direct(publisher, Arc::new(UnreachableTransport)));

        let config = MetricsConfig {
            enabled: true,
            bind_addr: "127.0.0.1:0".to_string(),
        };
        let server = MetricsServer::new(&config, Some(trigger)).unwrap();
        let Json(health) = health_check(State(server.state.clone())).await;

        assert_eq!(health.status, "degraded");
        assert_eq!(health.transport.as_deref(), Some("unreachable"));
        assert_eq!(health.transport_reachable, Some(false));
        assert_eq!(health.strategy.as_deref(), Some("fixedRate(10000ms)"));
    }
}
