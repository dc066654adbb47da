//! JSON codec for gateway envelopes
//!
//! Wire shape: `{ "op": <int>, "d": <any>, "s": <int|null>, "t": <string|null> }`.
//! Decoding never panics; anything that is not a well-formed envelope is a
//! [`DecodeError`].

use super::{Envelope, HelloPayload, IdentifyPayload, OpCode, Payload};
use crate::error::{DecodeError, EncodeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest heartbeat interval a hello may announce (one day)
pub const MAX_HEARTBEAT_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;
const MAX_INTERVAL_F64: f64 = 86_400_000.0;

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    op: i64,
    #[serde(default)]
    d: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    t: Option<String>,
}

/// Serialize an envelope to its text frame
pub fn encode(envelope: &Envelope) -> Result<String, EncodeError> {
    let (d, t) = match &envelope.payload {
        Payload::Dispatch { event, data } => (data.clone(), event.clone()),
        Payload::Heartbeat(seq) => (seq.map_or(Value::Null, Value::from), None),
        Payload::Identify(identify) => (serde_json::to_value(identify)?, None),
        Payload::Reconnect | Payload::HeartbeatAck => (Value::Null, None),
        Payload::InvalidSession { resumable } => (Value::Bool(*resumable), None),
        Payload::Hello(hello) => (serde_json::to_value(hello)?, None),
        Payload::Unknown { event, data, .. } => (data.clone(), event.clone()),
    };

    let wire = WireEnvelope {
        op: envelope.op(),
        d,
        s: envelope.sequence,
        t,
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Parse a text frame
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let wire: WireEnvelope = serde_json::from_str(text)?;
    let opcode = u8::try_from(wire.op).ok().and_then(OpCode::from_u8);
    let payload = match opcode {
        Some(OpCode::Dispatch) => Payload::Dispatch {
            event: wire.t,
            data: wire.d,
        },
        Some(OpCode::Heartbeat) => Payload::Heartbeat(match wire.d {
            Value::Null => None,
            Value::Number(n) => Some(n.as_u64().ok_or_else(|| {
                DecodeError::payload(OpCode::Heartbeat, format!("sequence {n} is not a u64"))
            })?),
            other => {
                return Err(DecodeError::payload(
                    OpCode::Heartbeat,
                    format!("expected sequence or null, got {other}"),
                ))
            }
        }),
        Some(OpCode::Identify) => Payload::Identify(typed::<IdentifyPayload>(OpCode::Identify, wire.d)?),
        Some(OpCode::Reconnect) => Payload::Reconnect,
        Some(OpCode::InvalidSession) => Payload::InvalidSession {
            resumable: match wire.d {
                Value::Null => false,
                Value::Bool(resumable) => resumable,
                other => {
                    return Err(DecodeError::payload(
                        OpCode::InvalidSession,
                        format!("expected bool, got {other}"),
                    ))
                }
            },
        },
        Some(OpCode::Hello) => Payload::Hello(hello_payload(&wire.d)?),
        Some(OpCode::HeartbeatAck) => Payload::HeartbeatAck,
        None => Payload::Unknown {
            op: wire.op,
            event: wire.t,
            data: wire.d,
        },
    };

    Ok(Envelope {
        sequence: wire.s,
        payload,
    })
}

/// Parse a binary frame holding UTF-8 JSON
pub fn decode_bytes(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
    decode(text)
}

/// Read the hello interval, in `1..=MAX_HEARTBEAT_INTERVAL_MS`
///
/// Whole-number floats (`41250.0`) are accepted; some servers encode every number
/// as a double.
#[allow(clippy::float_cmp, clippy::cast_sign_loss)]
fn hello_payload(data: &Value) -> Result<HelloPayload, DecodeError> {
    let raw = data
        .get("heartbeat_interval")
        .ok_or_else(|| DecodeError::payload(OpCode::Hello, "missing heartbeat_interval"))?;

    let interval = match (raw.as_u64(), raw.as_f64()) {
        (Some(ms), _) => ms,
        (None, Some(ms)) if ms.trunc() == ms && (0.0..=MAX_INTERVAL_F64).contains(&ms) => ms as u64,
        _ => {
            return Err(DecodeError::payload(
                OpCode::Hello,
                format!("heartbeat_interval {raw} is not a whole number of milliseconds"),
            ))
        }
    };

    if interval == 0 || interval > MAX_HEARTBEAT_INTERVAL_MS {
        return Err(DecodeError::payload(
            OpCode::Hello,
            format!("heartbeat_interval {interval} outside 1..={MAX_HEARTBEAT_INTERVAL_MS}"),
        ));
    }
    Ok(HelloPayload::with_interval(interval))
}

fn typed<T: serde::de::DeserializeOwned>(op: OpCode, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|e| DecodeError::payload(op, e.to_string()))
}
