//! Serialized frame writes
//!
//! Identify, heartbeats and the close frame all go through one [`FrameWriter`]; the
//! lock keeps frames from interleaving on the sink. Once closed, every send fails with
//! [`WriteError::Closed`].

use crate::error::WriteError;
use crate::protocol::{codec, Envelope};
use futures_util::{Sink, SinkExt};
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Cloneable handle to the outbound half of the connection
pub struct FrameWriter<S> {
    sink: Arc<Mutex<Option<S>>>,
    closed: Arc<AtomicBool>,
}

impl<S> Clone for FrameWriter<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<S> FrameWriter<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Close frame sent or transport released
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Encode and send one envelope as a text frame
    pub async fn send(&self, envelope: &Envelope) -> Result<(), WriteError> {
        let text = codec::encode(envelope)?;

        let mut guard = self.sink.lock().await;
        if self.is_closed() {
            return Err(WriteError::Closed);
        }
        let sink = guard.as_mut().ok_or(WriteError::Closed)?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))
    }

    /// Send a close frame, at most once per connection
    ///
    /// Returns `Ok(false)` when the writer was already closed.
    pub async fn close(&self, code: CloseCode, reason: &str) -> Result<bool, WriteError> {
        let mut guard = self.sink.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let Some(sink) = guard.as_mut() else {
            return Ok(false);
        };

        let frame = CloseFrame {
            code,
            reason: Cow::Owned(reason.to_string()),
        };
        sink.send(Message::Close(Some(frame)))
            .await
            .map_err(|e| WriteError::Transport(e.to_string()))?;
        Ok(true)
    }

    /// Drop the sink without any handshake
    pub async fn release(&self) {
        self.closed.store(true, Ordering::Release);
        drop(self.sink.lock().await.take());
    }
}
