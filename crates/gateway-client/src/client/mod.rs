//! Session orchestration
//!
//! [`GatewayClient::run`] opens the transport and drives one session: the receive loop
//! runs as its own task, and the orchestrator waits for whichever comes first of the
//! receive loop ending, the caller's shutdown future, or a reconnect request. Closing
//! is always done here, never by the receive loop.

mod receive;
mod shutdown;

use crate::connection::{FrameWriter, Session, SessionState};
use crate::error::GatewayError;
use crate::events::{EventHandler, LoggingHandler};
use crate::handlers::{DispatchContext, HeartbeatHandle, Signal};
use crate::transport::{self, RemoteClose};
use futures_util::{Sink, Stream, StreamExt};
use gateway_common::GatewayConfig;
use shutdown::Teardown;
use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller's shutdown future resolved
    Interrupted,
    /// Server sent op 7
    ReconnectRequested,
    /// Server sent op 9
    InvalidSession { resumable: bool },
    /// Server sent a close frame, or the stream ended without one
    RemoteClosed(Option<RemoteClose>),
    ReadError(String),
    DecodeError(String),
}

impl CloseReason {
    /// Graceful reasons send a close frame and wait for the server's answer
    #[must_use]
    pub const fn is_graceful(&self) -> bool {
        matches!(self, Self::Interrupted | Self::ReconnectRequested)
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("interrupted"),
            Self::ReconnectRequested => f.write_str("server requested reconnect"),
            Self::InvalidSession { resumable } => {
                write!(f, "invalid session (resumable: {resumable})")
            }
            Self::RemoteClosed(Some(close)) => write!(f, "closed by server ({close})"),
            Self::RemoteClosed(None) => f.write_str("connection closed by server"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::DecodeError(e) => write!(f, "malformed frame: {e}"),
        }
    }
}

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub connection_id: String,
    pub reason: CloseReason,
    /// Highest sequence committed before the session closed
    pub last_sequence: Option<u64>,
    /// A graceful close got the server's close frame within the close timeout
    pub close_acknowledged: bool,
}

/// Gateway client for one session at a time
pub struct GatewayClient<H: ?Sized = LoggingHandler> {
    config: GatewayConfig,
    handler: Arc<H>,
}

impl GatewayClient<LoggingHandler> {
    /// Client that logs every dispatch
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_handler(config, Arc::new(LoggingHandler))
    }
}

impl<H> GatewayClient<H>
where
    H: EventHandler + ?Sized + 'static,
{
    #[must_use]
    pub fn with_handler(config: GatewayConfig, handler: Arc<H>) -> Self {
        Self { config, handler }
    }

    /// Connect and drive one session until it closes
    ///
    /// Only a failure to open the transport is an error; every way an open session can
    /// end is reported in the returned [`SessionOutcome`].
    pub async fn run<F>(&self, shutdown: F) -> Result<SessionOutcome, GatewayError>
    where
        F: Future<Output = ()> + Send,
    {
        let session = Session::new(self.config.credential.clone());
        let url = self.config.endpoint.url();
        tracing::info!(connection_id = %session.connection_id(), url = %url, "Connecting to gateway");

        let stream = match transport::connect(&self.config).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(connection_id = %session.connection_id(), error = %e, "Failed to connect");
                session.advance(SessionState::ClosingForced);
                session.advance(SessionState::Closed);
                return Err(e.into());
            }
        };

        let (sink, stream) = stream.split();
        Ok(self.drive(session, sink, stream, shutdown).await)
    }

    /// Drive a session over an already open transport
    pub async fn run_with<S, R, E, F>(&self, sink: S, stream: R, shutdown: F) -> SessionOutcome
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        let session = Session::new(self.config.credential.clone());
        self.drive(session, sink, stream, shutdown).await
    }

    async fn drive<S, R, E, F>(
        &self,
        session: Arc<Session>,
        sink: S,
        stream: R,
        shutdown: F,
    ) -> SessionOutcome
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        F: Future<Output = ()> + Send,
    {
        session.advance(SessionState::AwaitingHello);

        let writer = FrameWriter::new(sink);
        let cancel = CancellationToken::new();
        let (signal_tx, mut signal_rx) = mpsc::channel(8);

        let ctx = DispatchContext {
            session: Arc::clone(&session),
            writer: writer.clone(),
            handler: Arc::clone(&self.handler),
            identity: self.config.identity.clone(),
            cancel: cancel.clone(),
            signals: signal_tx,
        };
        let mut receiver = tokio::spawn(receive::receive_loop(ctx, stream));

        let mut heartbeat: Option<HeartbeatHandle> = None;
        let mut status = self.config.timeouts.status_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });
        tokio::pin!(shutdown);

        let (reason, receiver_joined) = loop {
            tokio::select! {
                result = &mut receiver => {
                    let reason = result.unwrap_or_else(|e| {
                        tracing::error!(connection_id = %session.connection_id(), error = %e, "Receive task failed");
                        CloseReason::ReadError(format!("receive task failed: {e}"))
                    });
                    break (reason, true);
                }
                () = &mut shutdown => {
                    tracing::info!(connection_id = %session.connection_id(), "Shutdown requested");
                    break (CloseReason::Interrupted, false);
                }
                Some(signal) = signal_rx.recv() => match signal {
                    Signal::HeartbeatStarted(handle) => {
                        if let Some(previous) = heartbeat.replace(handle) {
                            previous.stop().await;
                        }
                    }
                    Signal::ReconnectRequested => break (CloseReason::ReconnectRequested, false),
                },
                () = status_tick(&mut status) => log_status(&session),
            }
        };

        Teardown {
            session,
            writer,
            cancel,
            heartbeat,
            receiver: (!receiver_joined).then_some(receiver),
            signals: signal_rx,
            close_timeout: self.config.timeouts.close,
        }
        .finish(reason, self.handler.as_ref())
        .await
    }
}

/// Next status tick; never resolves when status logging is off
async fn status_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_status(session: &Session) {
    tracing::info!(
        connection_id = %session.connection_id(),
        state = %session.state(),
        last_sequence = ?session.last_sequence(),
        latency_ms = session.latency().map(|l| l.as_millis()),
        "Gateway session status"
    );
}
