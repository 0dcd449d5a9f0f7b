//! Integration tests for the webhook transport using wiremock

mod common;

use std::time::Duration;

use common::*;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsletter::config::TransportConfig;
use newsletter::models::ContentStatus;
use newsletter::notifications::channels::webhook::{WebhookConfig, WebhookTransport};
use newsletter::notifications::{build_transport, NotificationTransport, TransportError};

fn transport(server: &MockServer) -> WebhookTransport {
    let config = WebhookConfig::new(format!("{}/deliver", server.uri()))
        .with_auth_token("secret-token")
        .with_max_retries(2)
        .with_backoff_ms(10);
    WebhookTransport::new(config).unwrap()
}

/// Test payload and auth header of a successful delivery
#[tokio::test]
async fn test_delivers_json_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/deliver"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(serde_json::json!({
            "recipient": "ana@example.com",
            "subject": "Newsletter: rust",
            "body": "This week in Rust",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let status = transport(&server)
        .send("ana@example.com", "Newsletter: rust", "This week in Rust")
        .await
        .unwrap();

    assert_eq!(status.transport, "webhook");
    assert_eq!(status.recipient, "ana@example.com");
    assert_eq!(status.message.as_deref(), Some("HTTP 202"));
}

/// Test that server errors are retried
#[tokio::test]
async fn test_server_error_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = transport(&server).send("ana@example.com", "s", "b").await;
    assert!(result.is_ok(), "Should succeed after retries: {:?}", result.err());
}

/// Test that client errors are not retried
#[tokio::test]
async fn test_client_error_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(422).set_body_string("unknown recipient"))
        .expect(1)
        .mount(&server)
        .await;

    let err = transport(&server)
        .send("ghost@example.com", "s", "b")
        .await
        .unwrap_err();

    match err {
        TransportError::Rejected(msg) => {
            assert!(msg.contains("422"));
            assert!(msg.contains("unknown recipient"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test that retries stop after max_retries
#[tokio::test]
async fn test_gives_up_after_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = transport(&server).send("ana@example.com", "s", "b").await.unwrap_err();
    assert!(err.is_recoverable());
}

/// Test direct dispatch through a transport built from configuration
#[tokio::test]
async fn test_direct_dispatch_over_webhook() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/deliver"))
        .and(body_partial_json(serde_json::json!({ "subject": "Newsletter: rust" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let config = TransportConfig {
        kind: "webhook".to_string(),
        webhook_url: Some(format!("{}/deliver", server.uri())),
        ..TransportConfig::default()
    };
    let transport = build_transport(&config).unwrap();
    assert_eq!(transport.name(), "webhook");

    let h = Harness::new();
    let topic = h
        .topic_with_subscribers("rust", &["ana@example.com", "bo@example.com"])
        .await;
    let content = h.content_at(&topic, "digest", 0).await;

    let (strategy, pool) = h.direct(transport);
    h.dispatcher(strategy).check_and_dispatch().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
        .await
        .unwrap();

    assert_eq!(h.status_of(&content).await, (ContentStatus::Sent, true));
    // `expect(2)` is verified when the server is dropped
}

/// Test the reachability check used by `/health`
#[tokio::test]
async fn test_health_check_reaches_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/deliver"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert!(transport(&server).health_check().await.unwrap());
}

#[tokio::test]
async fn test_health_check_unreachable_endpoint() {
    let config = WebhookConfig::new("http://127.0.0.1:9/deliver").with_timeout(2);
    let transport = WebhookTransport::new(config).unwrap();

    assert!(!transport.health_check().await.unwrap());
}

#[test]
fn test_unknown_transport_is_an_error() {
    let config = TransportConfig {
        kind: "carrier-pigeon".to_string(),
        ..TransportConfig::default()
    };
    assert!(matches!(
        build_transport(&config),
        Err(TransportError::InvalidConfig(_))
    ));
}
