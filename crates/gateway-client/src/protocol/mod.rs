//! Gateway protocol definitions
//!
//! Op codes, close codes, typed payloads, the envelope union and its JSON codec.

pub mod codec;
mod close_codes;
mod envelope;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use envelope::{Envelope, Payload};
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties};
