//! Test helpers for integration tests
//!
//! Provides a mock gateway bound to an ephemeral port and a handle for scripting one
//! accepted connection from the server side.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use futures_util::{SinkExt, StreamExt};
use gateway_client::{GatewayClient, SessionOutcome};
use gateway_common::{Credential, GatewayConfig, Scheme};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, StatusCode};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// Upper bound for any single wait in a test
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Mock gateway accepting WebSocket connections on localhost
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a gateway that completes every handshake
    pub async fn start() -> Result<Self> {
        Self::start_inner(None).await
    }

    /// Start a gateway that answers every handshake with `status`
    pub async fn start_rejecting(status: StatusCode) -> Result<Self> {
        Self::start_inner(Some(status)).await
    }

    async fn start_inner(reject: Option<StatusCode>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Ok(conn) = ServerConnection::accept(stream, reject).await {
                        let _ = tx.send(conn);
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connections: rx,
            _handle: handle,
        })
    }

    /// Client configuration pointing at this gateway
    pub fn config(&self, token: &str) -> GatewayConfig {
        let mut config = GatewayConfig::new(Scheme::Ws, self.addr.to_string(), Credential::new(token));
        config.timeouts.connect = Duration::from_secs(2);
        config
    }

    /// Wait for the next completed handshake
    pub async fn accept(&mut self) -> Result<ServerConnection> {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .map_err(|_| anyhow!("no client connected"))?
            .ok_or_else(|| anyhow!("gateway stopped accepting"))
    }
}

/// Server side of one accepted connection
pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
    /// `Authorization` header sent with the upgrade request
    pub authorization: Option<String>,
    /// Request path and query, e.g. `/?v=6&encoding=json`
    pub path: String,
}

impl ServerConnection {
    async fn accept(stream: TcpStream, reject: Option<StatusCode>) -> Result<Self> {
        let mut authorization = None;
        let mut path = String::new();

        let ws = accept_hdr_async(stream, |request: &Request, response: Response| {
            authorization = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            path = request.uri().to_string();

            match reject {
                Some(status) => {
                    let mut error = ErrorResponse::new(Some("rejected".to_string()));
                    *error.status_mut() = status;
                    Err(error)
                }
                None => Ok(response),
            }
        })
        .await?;

        Ok(Self {
            ws,
            authorization,
            path,
        })
    }

    /// Send a raw JSON text frame
    pub async fn send_json(&mut self, json: Value) -> Result<()> {
        self.ws.send(Message::Text(json.to_string())).await?;
        Ok(())
    }

    pub async fn hello(&mut self, heartbeat_interval_ms: u64) -> Result<()> {
        self.send_json(crate::fixtures::hello(heartbeat_interval_ms)).await
    }

    pub async fn dispatch(&mut self, sequence: u64, event: &str, data: Value) -> Result<()> {
        self.send_json(crate::fixtures::dispatch(sequence, event, data))
            .await
    }

    /// Send a close frame with `code`
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            }))
            .await?;
        Ok(())
    }

    /// Next text frame from the client, parsed as JSON
    pub async fn next_json(&mut self) -> Result<Value> {
        match self.next_message().await? {
            Some(Message::Text(text)) => Ok(serde_json::from_str(&text)?),
            Some(other) => bail!("expected text frame, got {other:?}"),
            None => bail!("client closed the connection"),
        }
    }

    /// Next frame with op `op`, skipping anything else
    pub async fn next_op(&mut self, op: u64) -> Result<Value> {
        loop {
            let frame = self.next_json().await?;
            if frame["op"] == op {
                return Ok(frame);
            }
        }
    }

    /// Next data or close frame; `None` once the client is gone
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let item = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for the client"))?;
            match item {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(message)) => return Ok(Some(message)),
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Read until the client closes; returns the close frame if it sent one
    ///
    /// Reading past the close frame lets tungstenite answer it.
    pub async fn drain_until_closed(&mut self) -> Result<Option<CloseFrame<'static>>> {
        let mut close = None;
        while let Some(message) = self.next_message().await? {
            if let Message::Close(frame) = message {
                close = Some(frame.unwrap_or(CloseFrame {
                    code: CloseCode::Status,
                    reason: "".into(),
                }));
            }
        }
        Ok(close)
    }
}

/// Client session running in the background with an interrupt switch
pub struct RunningClient {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<SessionOutcome, gateway_client::GatewayError>>,
}

impl RunningClient {
    /// Spawn `client.run` with a shutdown future this handle controls
    pub fn spawn<H>(client: GatewayClient<H>) -> Self
    where
        H: gateway_client::EventHandler + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            client
                .run(async move {
                    if stop_rx.await.is_err() {
                        std::future::pending::<()>().await;
                    }
                })
                .await
        });
        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Resolve the shutdown future
    pub fn interrupt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Wait for the session to end
    pub async fn outcome(self) -> Result<SessionOutcome> {
        let result = tokio::time::timeout(STEP_TIMEOUT, self.handle)
            .await
            .map_err(|_| anyhow!("client did not finish"))??;
        Ok(result?)
    }

    /// Wait for the session to end with a start error
    pub async fn error(self) -> Result<gateway_client::GatewayError> {
        let result = tokio::time::timeout(STEP_TIMEOUT, self.handle)
            .await
            .map_err(|_| anyhow!("client did not finish"))??;
        match result {
            Ok(outcome) => bail!("expected an error, session ended with {}", outcome.reason),
            Err(e) => Ok(e),
        }
    }
}
