//! Gateway client integration tests
//!
//! Each test runs the client against a local mock gateway over a real WebSocket.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::{Duration, Instant};

use gateway_client::protocol::CloseCode;
use gateway_client::{CloseReason, ConnectError, GatewayClient, GatewayError};
use integration_tests::{fixtures::*, MockGateway, RunningClient};
use serde_json::json;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_connects_with_authorization_and_query() {
    let mut gateway = MockGateway::start().await.unwrap();
    let token = unique_token();
    let mut client = RunningClient::spawn(GatewayClient::new(gateway.config(&token)));

    let mut conn = gateway.accept().await.unwrap();
    assert_eq!(conn.authorization.as_deref(), Some(token.as_str()));
    assert_eq!(conn.path, "/?v=6&encoding=json");

    client.interrupt();
    conn.drain_until_closed().await.unwrap();
    client.outcome().await.unwrap();
}

#[tokio::test]
async fn test_identify_follows_hello() {
    let mut gateway = MockGateway::start().await.unwrap();
    let token = unique_token();
    let mut client = RunningClient::spawn(GatewayClient::new(gateway.config(&token)));
    let mut conn = gateway.accept().await.unwrap();

    conn.hello(45_000).await.unwrap();
    let identify = conn.next_json().await.unwrap();

    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], token.as_str());
    assert_eq!(identify["d"]["properties"]["$os"], std::env::consts::OS);
    assert_eq!(identify["d"]["properties"]["$browser"], "gateway-client");
    assert_eq!(identify["d"]["properties"]["$device"], "gateway-client");
    assert!(identify.get("s").is_none());
    assert!(identify.get("t").is_none());

    // A second hello must not trigger another identify
    conn.hello(45_000).await.unwrap();
    conn.send_json(heartbeat_request()).await.unwrap();
    assert_eq!(conn.next_json().await.unwrap()["op"], 1);

    client.interrupt();
    conn.drain_until_closed().await.unwrap();
    client.outcome().await.unwrap();
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeats_at_hello_interval_with_sequence() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));
    let mut conn = gateway.accept().await.unwrap();

    let start = Instant::now();
    conn.hello(200).await.unwrap();
    conn.next_op(2).await.unwrap();

    let first = conn.next_op(1).await.unwrap();
    assert_eq!(first["d"], json!(null));
    assert!(start.elapsed() >= Duration::from_millis(200));
    conn.send_json(heartbeat_ack()).await.unwrap();

    conn.send_json(ready(1)).await.unwrap();
    conn.dispatch(2, "MESSAGE_CREATE", json!({ "content": "hi" }))
        .await
        .unwrap();

    let second = conn.next_op(1).await.unwrap();
    assert_eq!(second["d"], 2);
    assert!(start.elapsed() >= Duration::from_millis(400));

    client.interrupt();
    conn.drain_until_closed().await.unwrap();
    let outcome = client.outcome().await.unwrap();
    assert_eq!(outcome.last_sequence, Some(2));
}

#[tokio::test]
async fn test_heartbeat_request_is_answered_immediately() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));
    let mut conn = gateway.accept().await.unwrap();

    conn.hello(60_000).await.unwrap();
    conn.next_op(2).await.unwrap();
    conn.send_json(ready(4)).await.unwrap();
    conn.send_json(heartbeat_request()).await.unwrap();

    let beat = conn.next_json().await.unwrap();
    assert_eq!(beat, json!({ "op": 1, "d": 4 }));

    client.interrupt();
    conn.drain_until_closed().await.unwrap();
    client.outcome().await.unwrap();
}

// ============================================================================
// Closing
// ============================================================================

#[tokio::test]
async fn test_interrupt_sends_normal_close() {
    let mut gateway = MockGateway::start().await.unwrap();
    let mut client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));
    let mut conn = gateway.accept().await.unwrap();

    conn.hello(45_000).await.unwrap();
    conn.next_op(2).await.unwrap();

    client.interrupt();
    let close = conn.drain_until_closed().await.unwrap().expect("close frame");
    assert_eq!(close.code, WsCloseCode::Normal);

    let outcome = client.outcome().await.unwrap();
    assert_eq!(outcome.reason, CloseReason::Interrupted);
    assert!(outcome.close_acknowledged);
}

#[tokio::test]
async fn test_reconnect_request_closes_gracefully() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));
    let mut conn = gateway.accept().await.unwrap();

    conn.hello(45_000).await.unwrap();
    conn.next_op(2).await.unwrap();
    conn.send_json(reconnect()).await.unwrap();

    let close = conn.drain_until_closed().await.unwrap().expect("close frame");
    assert_eq!(close.code, WsCloseCode::Normal);

    let outcome = client.outcome().await.unwrap();
    assert_eq!(outcome.reason, CloseReason::ReconnectRequested);
}

#[tokio::test]
async fn test_invalid_session_drops_without_close_frame() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));
    let mut conn = gateway.accept().await.unwrap();

    conn.hello(45_000).await.unwrap();
    conn.next_op(2).await.unwrap();
    conn.send_json(invalid_session(false)).await.unwrap();

    let outcome = client.outcome().await.unwrap();
    assert_eq!(outcome.reason, CloseReason::InvalidSession { resumable: false });
    assert!(!outcome.close_acknowledged);
    assert!(conn.drain_until_closed().await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_close_code_is_reported() {
    let mut gateway = MockGateway::start().await.unwrap();
    let client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));
    let mut conn = gateway.accept().await.unwrap();

    conn.hello(45_000).await.unwrap();
    conn.next_op(2).await.unwrap();
    conn.close(4004, "Authentication failed.").await.unwrap();

    let outcome = client.outcome().await.unwrap();
    let CloseReason::RemoteClosed(Some(close)) = outcome.reason else {
        panic!("expected remote close, got {}", outcome.reason);
    };
    assert_eq!(close.gateway_code(), Some(CloseCode::AuthenticationFailed));
    assert_eq!(close.reason, "Authentication failed.");
}

// ============================================================================
// Connect failures
// ============================================================================

#[tokio::test]
async fn test_rejected_handshake() {
    let gateway = MockGateway::start_rejecting(StatusCode::UNAUTHORIZED)
        .await
        .unwrap();
    let client = RunningClient::spawn(GatewayClient::new(gateway.config(&unique_token())));

    let err = client.error().await.unwrap();
    assert!(
        matches!(err, GatewayError::Connect(ConnectError::Rejected { status: 401 })),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_unreachable_gateway() {
    let gateway = MockGateway::start().await.unwrap();
    let mut config = gateway.config(&unique_token());
    drop(gateway);

    // Nothing listens on a freshly released port
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    config.endpoint.addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = RunningClient::spawn(GatewayClient::new(config));
    let err = client.error().await.unwrap();
    assert!(matches!(err, GatewayError::Connect(_)), "got {err:?}");
}
