//! Test fixtures and data generators
//!
//! Server-side frames in their wire form.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Token that differs per test
pub fn unique_token() -> String {
    format!("test-token-{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}

pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({ "op": 10, "d": { "heartbeat_interval": heartbeat_interval_ms } })
}

pub fn dispatch(sequence: u64, event: &str, data: Value) -> Value {
    json!({ "op": 0, "s": sequence, "t": event, "d": data })
}

pub fn ready(sequence: u64) -> Value {
    dispatch(
        sequence,
        "READY",
        json!({ "v": 6, "session_id": "mock-session", "user": { "id": "1", "username": "mybot" } }),
    )
}

pub fn heartbeat_ack() -> Value {
    json!({ "op": 11 })
}

pub fn heartbeat_request() -> Value {
    json!({ "op": 1, "d": null })
}

pub fn reconnect() -> Value {
    json!({ "op": 7, "d": null })
}

pub fn invalid_session(resumable: bool) -> Value {
    json!({ "op": 9, "d": resumable })
}
