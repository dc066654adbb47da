//! Integration test utilities for the gateway client
//!
//! This crate provides a scripted mock gateway that speaks the wire protocol over a
//! real socket, so the client can be driven end to end.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
