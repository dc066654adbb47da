//! Op code handlers
//!
//! Routes each decoded server envelope to the component that owns it.

mod heartbeat;
mod identify;

pub use heartbeat::{HeartbeatHandle, HeartbeatScheduler};
pub use identify::{build_identify, IdentifyHandler};

use crate::client::CloseReason;
use crate::connection::{FrameWriter, Session, SessionState};
use crate::events::{DispatchEvent, EventHandler};
use crate::protocol::{Envelope, HelloPayload, Payload};
use futures_util::Sink;
use gateway_common::ClientIdentity;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Messages from the receive loop to the orchestrator
#[derive(Debug)]
pub enum Signal {
    /// The connection's heartbeat task; the orchestrator stops it before `Closed`
    HeartbeatStarted(HeartbeatHandle),
    /// Server sent op 7
    ReconnectRequested,
}

/// What the receive loop does after an envelope
#[derive(Debug)]
pub enum Flow {
    Continue,
    Exit(CloseReason),
}

/// Everything the handlers touch, owned by the receive loop
pub struct DispatchContext<S, H: ?Sized> {
    pub session: Arc<Session>,
    pub writer: FrameWriter<S>,
    pub handler: Arc<H>,
    pub identity: ClientIdentity,
    /// Session-wide token; the heartbeat task gets a child of it
    pub cancel: CancellationToken,
    pub signals: mpsc::Sender<Signal>,
}

/// Dispatch incoming server envelopes to the appropriate handler
pub struct MessageDispatcher;

impl MessageDispatcher {
    pub async fn dispatch<S, H>(ctx: &DispatchContext<S, H>, envelope: Envelope) -> Flow
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        H: EventHandler + ?Sized,
    {
        let session = &ctx.session;
        tracing::trace!(connection_id = %session.connection_id(), envelope = %envelope, "Received envelope");

        match envelope.payload {
            Payload::Hello(hello) => {
                Self::on_hello(ctx, &hello).await;
                Flow::Continue
            }
            Payload::Dispatch { event, data } => {
                if let Some(seq) = envelope.sequence {
                    session.observe_sequence(seq);
                }
                let event = DispatchEvent {
                    name: event,
                    sequence: envelope.sequence,
                    data,
                };
                ctx.handler.on_dispatch(&event).await;
                Flow::Continue
            }
            Payload::HeartbeatAck => {
                if let Some(seq) = envelope.sequence {
                    session.observe_sequence(seq);
                }
                if let Some(latency) = session.record_heartbeat_ack() {
                    tracing::trace!(
                        connection_id = %session.connection_id(),
                        latency_ms = latency.as_millis(),
                        "Heartbeat acknowledged"
                    );
                }
                Flow::Continue
            }
            Payload::Heartbeat(_) => {
                // Server asks for an immediate heartbeat
                if let Err(e) = HeartbeatScheduler::beat(session, &ctx.writer).await {
                    tracing::warn!(
                        connection_id = %session.connection_id(),
                        error = %e,
                        "Failed to answer heartbeat request"
                    );
                }
                Flow::Continue
            }
            Payload::Reconnect => {
                tracing::info!(connection_id = %session.connection_id(), "Server requested reconnect");
                // A closed channel means the orchestrator is already shutting down
                let _ = ctx.signals.send(Signal::ReconnectRequested).await;
                Flow::Continue
            }
            Payload::InvalidSession { resumable } => {
                tracing::warn!(
                    connection_id = %session.connection_id(),
                    resumable,
                    "Session invalidated by server"
                );
                Flow::Exit(CloseReason::InvalidSession { resumable })
            }
            Payload::Identify(_) => {
                tracing::warn!(
                    connection_id = %session.connection_id(),
                    "Ignoring client-only op code from server"
                );
                Flow::Continue
            }
            Payload::Unknown { op, .. } => {
                tracing::debug!(connection_id = %session.connection_id(), op, "Ignoring unknown op code");
                Flow::Continue
            }
        }
    }

    /// `AwaitingHello → Identifying → Active`, exactly once per connection
    async fn on_hello<S, H>(ctx: &DispatchContext<S, H>, hello: &HelloPayload)
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        H: EventHandler + ?Sized,
    {
        let session = &ctx.session;
        let interval = Duration::from_millis(hello.heartbeat_interval);

        if !session.begin_identify(interval) {
            tracing::warn!(
                connection_id = %session.connection_id(),
                state = %session.state(),
                "Ignoring repeated hello"
            );
            return;
        }

        if let Err(e) = IdentifyHandler::send(session, &ctx.writer, &ctx.identity).await {
            tracing::warn!(
                connection_id = %session.connection_id(),
                error = %e,
                "Failed to send identify"
            );
        }

        let handle = HeartbeatScheduler::spawn(
            Arc::clone(session),
            ctx.writer.clone(),
            interval,
            ctx.cancel.child_token(),
        );
        if let Err(mpsc::error::SendError(Signal::HeartbeatStarted(orphan))) =
            ctx.signals.send(Signal::HeartbeatStarted(handle)).await
        {
            orphan.stop().await;
        }

        if session.advance(SessionState::Active) {
            tracing::info!(
                connection_id = %session.connection_id(),
                heartbeat_interval_ms = hello.heartbeat_interval,
                "Gateway session active"
            );
        }
    }
}
