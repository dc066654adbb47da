//! Heartbeat scheduler (op 1)
//!
//! One background task per connection. It waits the hello interval, sends the last
//! committed sequence, and repeats until its token is cancelled. Cancellation wins
//! over a pending tick, so a closing session never waits out an interval.

use crate::connection::{FrameWriter, Session};
use crate::error::WriteError;
use crate::protocol::{codec, Envelope};
use futures_util::Sink;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Bounds on the schedule period; hello decoding already enforces the upper one
const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_millis(codec::MAX_HEARTBEAT_INTERVAL_MS);

/// Handle to a running scheduler
#[derive(Debug)]
pub struct HeartbeatHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Cancel the scheduler and wait for it to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "Heartbeat task panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns heartbeat tasks
pub struct HeartbeatScheduler;

impl HeartbeatScheduler {
    /// Start heartbeating every `interval`; `cancel` is usually a child of the session token
    pub fn spawn<S>(
        session: Arc<Session>,
        writer: FrameWriter<S>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> HeartbeatHandle
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
    {
        let task = tokio::spawn(run(session, writer, interval, cancel.clone()));
        HeartbeatHandle { cancel, task }
    }

    /// Send one heartbeat right now with the current committed sequence
    pub async fn beat<S>(session: &Session, writer: &FrameWriter<S>) -> Result<(), WriteError>
    where
        S: Sink<Message> + Unpin + Send,
        S::Error: Display,
    {
        let sequence = session.last_sequence();
        if !session.record_heartbeat_sent() {
            tracing::warn!(
                connection_id = %session.connection_id(),
                "Previous heartbeat was not acknowledged, connection may be zombied"
            );
        }
        writer.send(&Envelope::heartbeat(sequence)).await?;
        tracing::trace!(connection_id = %session.connection_id(), seq = ?sequence, "Heartbeat sent");
        Ok(())
    }
}

async fn run<S>(
    session: Arc<Session>,
    writer: FrameWriter<S>,
    interval: Duration,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    let period = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
    if period != interval {
        tracing::warn!(
            connection_id = %session.connection_id(),
            requested_ms = interval.as_millis(),
            interval_ms = period.as_millis(),
            "Heartbeat interval out of range, clamped"
        );
    }
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        connection_id = %session.connection_id(),
        interval_ms = period.as_millis(),
        "Heartbeat scheduler started"
    );

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A peer that stops reading can stall the send; cancellation still wins
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = HeartbeatScheduler::beat(&session, &writer) => result,
        };

        match result {
            Ok(()) => {}
            Err(WriteError::Closed) => break,
            Err(e) => {
                tracing::warn!(
                    connection_id = %session.connection_id(),
                    error = %e,
                    "Failed to send heartbeat"
                );
            }
        }
    }

    tracing::debug!(connection_id = %session.connection_id(), "Heartbeat scheduler stopped");
}
