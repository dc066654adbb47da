//! Receive loop
//!
//! Owns the read half. Runs until the server closes, a read or decode fails, or a
//! handler asks to end the session. It never writes a close frame itself.

use super::CloseReason;
use crate::events::EventHandler;
use crate::handlers::{DispatchContext, Flow, MessageDispatcher};
use crate::transport::{self, Inbound, RemoteClose};
use futures_util::{Sink, Stream, StreamExt};
use std::fmt::Display;
use tokio_tungstenite::tungstenite::Message;

pub(super) async fn receive_loop<S, H, R, E>(ctx: DispatchContext<S, H>, mut stream: R) -> CloseReason
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    H: EventHandler + ?Sized,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let connection_id = ctx.session.connection_id().to_owned();

    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to read from gateway");
                return CloseReason::ReadError(e.to_string());
            }
        };

        let envelope = match transport::classify(message) {
            Ok(Inbound::Envelope(envelope)) => envelope,
            Ok(Inbound::Ignored) => continue,
            Ok(Inbound::Close(close)) => {
                let description = close.as_ref().map(ToString::to_string);
                if close.as_ref().is_some_and(RemoteClose::is_fatal) {
                    tracing::error!(
                        connection_id = %connection_id,
                        close = ?description,
                        "Gateway refused the session, the same configuration will not be accepted again"
                    );
                } else {
                    tracing::info!(
                        connection_id = %connection_id,
                        close = ?description,
                        "Gateway sent close frame"
                    );
                }
                return CloseReason::RemoteClosed(close);
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Dropping session on malformed frame");
                return CloseReason::DecodeError(e.to_string());
            }
        };

        if let Flow::Exit(reason) = MessageDispatcher::dispatch(&ctx, envelope).await {
            return reason;
        }
    }

    tracing::debug!(connection_id = %connection_id, "Gateway stream ended");
    CloseReason::RemoteClosed(None)
}
