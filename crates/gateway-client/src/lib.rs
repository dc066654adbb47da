//! # gateway-client
//!
//! Client side of a WebSocket gateway session: identify once, heartbeat at the
//! server's interval, consume dispatched events, and shut down cleanly.

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod handlers;
pub mod protocol;
pub mod transport;

pub use client::{CloseReason, GatewayClient, SessionOutcome};
pub use error::{ConnectError, DecodeError, EncodeError, GatewayError, WriteError};
pub use events::{DispatchEvent, EventHandler, LoggingHandler};
