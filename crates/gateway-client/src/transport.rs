//! WebSocket transport
//!
//! Opens the gateway connection with the credential in the `Authorization` header and
//! classifies inbound frames for the receive loop.

use crate::error::{ConnectError, DecodeError};
use crate::protocol::{codec, CloseCode, Envelope};
use gateway_common::GatewayConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the gateway connection described by `config`
pub async fn connect(config: &GatewayConfig) -> Result<WsStream, ConnectError> {
    let url = config.endpoint.url();
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ConnectError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let mut authorization = HeaderValue::from_str(config.credential.expose())
        .map_err(|_| ConnectError::InvalidCredential)?;
    authorization.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, authorization);

    let timeout = config.timeouts.connect;
    match tokio::time::timeout(timeout, connect_async(request)).await {
        Ok(Ok((stream, response))) => {
            tracing::debug!(
                url = %url,
                status = response.status().as_u16(),
                "Gateway handshake complete"
            );
            Ok(stream)
        }
        Ok(Err(tungstenite::Error::Http(response))) => Err(ConnectError::Rejected {
            status: response.status().as_u16(),
        }),
        Ok(Err(e)) => Err(ConnectError::Transport(Box::new(e))),
        Err(_) => Err(ConnectError::Timeout(timeout)),
    }
}

/// Close frame received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteClose {
    pub code: u16,
    pub reason: String,
}

impl RemoteClose {
    /// Gateway-specific meaning of the code, if it has one
    #[must_use]
    pub fn gateway_code(&self) -> Option<CloseCode> {
        CloseCode::from_u16(self.code)
    }

    /// Whether a new session with the same configuration would be refused too
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.gateway_code().is_some_and(CloseCode::is_fatal)
    }
}

impl std::fmt::Display for RemoteClose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.gateway_code() {
            Some(code) => write!(f, "{code}")?,
            None => write!(f, "code {}", self.code)?,
        }
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

/// What an inbound frame means to the receive loop
#[derive(Debug)]
pub enum Inbound {
    Envelope(Envelope),
    Close(Option<RemoteClose>),
    /// Control frames tungstenite already answers (ping/pong)
    Ignored,
}

/// Classify a transport message; text and binary frames are decoded
pub fn classify(message: Message) -> Result<Inbound, DecodeError> {
    match message {
        Message::Text(text) => codec::decode(&text).map(Inbound::Envelope),
        Message::Binary(bytes) => codec::decode_bytes(&bytes).map(Inbound::Envelope),
        Message::Close(frame) => Ok(Inbound::Close(frame.map(|f| RemoteClose {
            code: u16::from(f.code),
            reason: f.reason.into_owned(),
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Ignored),
    }
}
