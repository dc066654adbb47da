//! The unit of wire communication
//!
//! `d` is typed per op code instead of being an untyped map. Op codes this client does
//! not know survive as [`Payload::Unknown`] so newer servers do not break decoding.

use super::{HelloPayload, IdentifyPayload, OpCode};
use serde_json::Value;

/// A decoded gateway frame
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// `s` on the wire
    pub sequence: Option<u64>,
    pub payload: Payload,
}

/// Op-code-specific contents of an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// op 0, the only op that carries an event name (`t`)
    Dispatch { event: Option<String>, data: Value },
    /// op 1, last sequence seen by the sender
    Heartbeat(Option<u64>),
    /// op 2
    Identify(IdentifyPayload),
    /// op 7
    Reconnect,
    /// op 9
    InvalidSession { resumable: bool },
    /// op 10
    Hello(HelloPayload),
    /// op 11
    HeartbeatAck,
    /// Any op code without a variant above; `op` is never a known [`OpCode`]
    Unknown {
        op: i64,
        event: Option<String>,
        data: Value,
    },
}

impl Envelope {
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            sequence: None,
            payload,
        }
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Heartbeat carrying the last sequence the client committed
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(Payload::Heartbeat(last_sequence))
    }

    #[must_use]
    pub fn identify(payload: IdentifyPayload) -> Self {
        Self::new(Payload::Identify(payload))
    }

    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(Payload::Hello(HelloPayload::with_interval(heartbeat_interval)))
    }

    #[must_use]
    pub fn dispatch(event: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self::new(Payload::Dispatch {
            event: Some(event.into()),
            data,
        })
        .with_sequence(sequence)
    }

    /// Raw op code as written on the wire
    #[must_use]
    pub fn op(&self) -> i64 {
        match &self.payload {
            Payload::Unknown { op, .. } => *op,
            known => known.opcode().map_or(-1, |op| i64::from(op.as_u8())),
        }
    }

    /// Known op code, `None` for [`Payload::Unknown`]
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        self.payload.opcode()
    }
}

impl Payload {
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        Some(match self {
            Self::Dispatch { .. } => OpCode::Dispatch,
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::Identify(_) => OpCode::Identify,
            Self::Reconnect => OpCode::Reconnect,
            Self::InvalidSession { .. } => OpCode::InvalidSession,
            Self::Hello(_) => OpCode::Hello,
            Self::HeartbeatAck => OpCode::HeartbeatAck,
            Self::Unknown { .. } => return None,
        })
    }

    /// Event name, only ever present on dispatch-like payloads
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Dispatch { event, .. } | Self::Unknown { event, .. } => event.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "Envelope(op={op}")?,
            None => write!(f, "Envelope(op=Unknown ({})", self.op())?,
        }
        if let Some(t) = self.payload.event() {
            write!(f, ", t={t}")?;
        }
        if let Some(s) = self.sequence {
            write!(f, ", s={s}")?;
        }
        write!(f, ")")
    }
}
