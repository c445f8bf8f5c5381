//! Frame encode/decode for entity traffic.
//!
//! Both directions use the same one-byte-header shape:
//!
//! ```text
//! invocation:  [ method id (1 byte) ][ codec-encoded argument tuple ... ]
//! push:        [ event id  (1 byte) ][ codec-encoded payload ... ]
//! ```
//!
//! The header byte indexes an identifier table built deterministically on
//! each side ([`crate::contract`]); the body is opaque to this module.

use crate::error::ProtocolViolation;

/// One inbound call: method id plus the still-encoded argument tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationMessage {
    pub method_id: u8,
    pub args: Vec<u8>,
}

impl InvocationMessage {
    pub fn new(method_id: u8, args: Vec<u8>) -> Self {
        Self { method_id, args }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.args.len());
        buf.push(self.method_id);
        buf.extend_from_slice(&self.args);
        buf
    }

    /// Decode from wire bytes. The only structural requirement is the
    /// header byte; a zero-argument call has an empty body.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolViolation> {
        match data.split_first() {
            Some((&method_id, args)) => Ok(Self {
                method_id,
                args: args.to_vec(),
            }),
            None => Err(ProtocolViolation::ShortFrame { len: data.len() }),
        }
    }
}

/// One server-to-client push: event id plus the still-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub event_id: u8,
    pub payload: Vec<u8>,
}

impl PushMessage {
    pub fn new(event_id: u8, payload: Vec<u8>) -> Self {
        Self { event_id, payload }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.payload.len());
        buf.push(self.event_id);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolViolation> {
        match data.split_first() {
            Some((&event_id, payload)) => Ok(Self {
                event_id,
                payload: payload.to_vec(),
            }),
            None => Err(ProtocolViolation::ShortFrame { len: data.len() }),
        }
    }
}
