//! Codec seam between typed contract edges and wire bytes.
//!
//! Arguments and return values travel as trees in the msgpack data model
//! ([`WireValue`]); a [`Codec`] decides how a tree becomes bytes. The
//! default is msgpack via `rmp-serde`, but nothing in the dispatch path
//! assumes it — swap the codec and the identifier tables, frames, and
//! invoker logic are untouched.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Erased argument/return value tree.
pub type WireValue = rmpv::Value;

/// Byte-format strategy for argument tuples and single values.
///
/// Implementations must be symmetric: anything encoded must decode back to
/// the same tree. The frame header byte is not the codec's concern; it only
/// ever sees the body.
pub trait Codec: Send + Sync {
    /// Encode an argument tuple.
    fn encode_values(&self, values: &[WireValue]) -> Result<Vec<u8>, CodecError>;

    /// Decode an argument tuple, checking it holds exactly `expected` slots.
    fn decode_values(&self, bytes: &[u8], expected: usize) -> Result<Vec<WireValue>, CodecError>;

    /// Encode one value (return values, push payloads).
    fn encode_value(&self, value: &WireValue) -> Result<Vec<u8>, CodecError>;

    /// Decode one value.
    fn decode_value(&self, bytes: &[u8]) -> Result<WireValue, CodecError>;
}

/// Default codec: msgpack.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgpackCodec;

impl Codec for MsgpackCodec {
    fn encode_values(&self, values: &[WireValue]) -> Result<Vec<u8>, CodecError> {
        self.encode_value(&WireValue::Array(values.to_vec()))
    }

    fn decode_values(&self, bytes: &[u8], expected: usize) -> Result<Vec<WireValue>, CodecError> {
        match self.decode_value(bytes)? {
            WireValue::Array(values) if values.len() == expected => Ok(values),
            WireValue::Array(values) => Err(CodecError::Decode(format!(
                "argument tuple holds {} values, expected {expected}",
                values.len()
            ))),
            other => Err(CodecError::Decode(format!(
                "expected argument array, got {other}"
            ))),
        }
    }

    fn encode_value(&self, value: &WireValue) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<WireValue, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

/// Convert a typed payload into the erased tree.
pub fn to_wire<T: Serialize>(value: &T) -> Result<WireValue, CodecError> {
    rmpv::ext::to_value(value).map_err(|err| CodecError::Encode(err.to_string()))
}

/// Convert an erased tree back into a typed payload.
pub fn from_wire<T: DeserializeOwned>(value: WireValue) -> Result<T, CodecError> {
    rmpv::ext::from_value(value).map_err(|err| CodecError::Decode(err.to_string()))
}
