//! Error types
//!
//! Only [`GatewayError`] ever reaches the caller of [`crate::GatewayClient::run`]; decode
//! and read failures end the session and are reported through
//! [`crate::CloseReason`], write failures are logged where they happen.

use crate::protocol::OpCode;
use gateway_common::ConfigError;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failure to start a session
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Transport could not be established
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid gateway URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Credential is not a valid Authorization header value")]
    InvalidCredential,

    #[error("Gateway rejected the handshake with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Timed out after {0:?} connecting to the gateway")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[source] Box<tungstenite::Error>),
}

/// Inbound frame is not a well-formed envelope
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid {op} payload: {reason}")]
    Payload { op: OpCode, reason: String },

    #[error("Binary frame is not valid UTF-8")]
    NotUtf8,
}

impl DecodeError {
    pub(crate) fn payload(op: OpCode, reason: impl Into<String>) -> Self {
        Self::Payload {
            op,
            reason: reason.into(),
        }
    }
}

/// Outbound envelope could not be serialized
#[derive(Debug, Error)]
#[error("Failed to encode envelope: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Sending identify, a heartbeat or the close frame failed
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Connection is closed")]
    Closed,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Transport write failed: {0}")]
    Transport(String),
}
