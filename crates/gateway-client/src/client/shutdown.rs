//! Session teardown
//!
//! Both close paths end the same way: heartbeat stopped, transport released, session
//! `Closed`, handler told. They differ in whether the server gets a close frame and a
//! bounded chance to answer it.

use super::{CloseReason, SessionOutcome};
use crate::connection::{FrameWriter, Session, SessionState};
use crate::events::EventHandler;
use crate::handlers::{HeartbeatHandle, Signal};
use futures_util::Sink;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Everything the orchestrator still owns when the session ends
pub(super) struct Teardown<S> {
    pub session: Arc<Session>,
    pub writer: FrameWriter<S>,
    pub cancel: CancellationToken,
    pub heartbeat: Option<HeartbeatHandle>,
    /// `None` once the receive task has been joined
    pub receiver: Option<JoinHandle<CloseReason>>,
    pub signals: mpsc::Receiver<Signal>,
    pub close_timeout: Duration,
}

impl<S> Teardown<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub async fn finish<H>(self, reason: CloseReason, handler: &H) -> SessionOutcome
    where
        H: EventHandler + ?Sized,
    {
        let Self {
            session,
            writer,
            cancel,
            heartbeat,
            receiver,
            mut signals,
            close_timeout,
        } = self;

        cancel.cancel();
        if let Some(handle) = heartbeat {
            handle.stop().await;
        }

        let close_acknowledged = if reason.is_graceful() {
            session.advance(SessionState::ClosingGraceful);
            graceful(&session, &writer, receiver, close_timeout).await
        } else {
            session.advance(SessionState::ClosingForced);
            if let Some(receiver) = receiver {
                abort(receiver).await;
            }
            false
        };

        writer.release().await;

        // A hello handled just before the receive task stopped may have started a scheduler
        signals.close();
        while let Some(signal) = signals.recv().await {
            if let Signal::HeartbeatStarted(handle) = signal {
                handle.stop().await;
            }
        }

        session.advance(SessionState::Closed);
        tracing::info!(
            connection_id = %session.connection_id(),
            reason = %reason,
            close_acknowledged,
            last_sequence = ?session.last_sequence(),
            "Session closed"
        );
        handler.on_closed(&reason).await;

        SessionOutcome {
            connection_id: session.connection_id().to_owned(),
            reason,
            last_sequence: session.last_sequence(),
            close_acknowledged,
        }
    }
}

/// Send a normal close and give the server `close_timeout` to answer
///
/// Returns whether the server closed its side in time. A stalled transport never
/// holds this past the deadline.
async fn graceful<S>(
    session: &Session,
    writer: &FrameWriter<S>,
    receiver: Option<JoinHandle<CloseReason>>,
    close_timeout: Duration,
) -> bool
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    // One deadline covers both the close frame write and the server's answer
    let deadline = Instant::now() + close_timeout;

    match timeout_at(deadline, writer.close(WsCloseCode::Normal, "")).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            tracing::warn!(connection_id = %session.connection_id(), error = %e, "Failed to send close frame");
        }
        Err(_) => {
            tracing::warn!(
                connection_id = %session.connection_id(),
                timeout_ms = close_timeout.as_millis(),
                "Close frame write stalled"
            );
        }
    }

    let Some(mut receiver) = receiver else {
        return false;
    };

    match timeout_at(deadline, &mut receiver).await {
        Ok(Ok(CloseReason::RemoteClosed(_))) => true,
        Ok(Ok(other)) => {
            tracing::debug!(
                connection_id = %session.connection_id(),
                reason = %other,
                "Receive loop ended without a close handshake"
            );
            false
        }
        Ok(Err(e)) => {
            tracing::error!(connection_id = %session.connection_id(), error = %e, "Receive task failed");
            false
        }
        Err(_) => {
            tracing::warn!(
                connection_id = %session.connection_id(),
                timeout_ms = close_timeout.as_millis(),
                "Server did not answer close, dropping connection"
            );
            abort(receiver).await;
            false
        }
    }
}

async fn abort(receiver: JoinHandle<CloseReason>) {
    receiver.abort();
    if let Err(e) = receiver.await {
        if e.is_panic() {
            tracing::error!(error = %e, "Receive task panicked");
        }
    }
}
