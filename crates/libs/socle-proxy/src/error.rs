use socle_entity::CallFailure;

/// Encode/decode failure inside a [`Codec`](crate::codec::Codec)
/// implementation. Carries the codec's own message as a string so the seam
/// stays object-safe across codecs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// Construction-time failure of an identifier table or invoker. These fire
/// once, at wiring time, never per call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("contract declares {count} methods, identifier space holds 256")]
    TooManyMethods { count: usize },

    #[error("contract declares {count} event types, identifier space holds 256")]
    TooManyEvents { count: usize },

    #[error("duplicate method signature: {signature}")]
    DuplicateMethod { signature: String },

    #[error("duplicate method name: {name}")]
    DuplicateMethodName { name: &'static str },

    #[error("duplicate event type: {event_type}")]
    DuplicateEventType { event_type: &'static str },

    #[error("event type {event_type} is not declared by the target")]
    UndeclaredEventType { event_type: &'static str },

    #[error("event type {event_type} already wired to a sink")]
    AlreadyWired { event_type: &'static str },
}

/// Malformed frame or identifier-resolution failure. Hard failures: the
/// offending frame is discarded, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ProtocolViolation {
    #[error("frame too short: {len} bytes")]
    ShortFrame { len: usize },

    #[error("unknown method id {id} for contract {contract} ({method_count} methods)")]
    UnknownMethodId {
        contract: &'static str,
        id: u8,
        method_count: usize,
    },

    #[error("contract {contract} has no method named {name}")]
    UnknownMethod {
        contract: &'static str,
        name: String,
    },

    #[error("unknown event id {id} ({event_count} event types declared)")]
    UnknownEventId { id: u8, event_count: usize },

    #[error("method {method} takes {expected} arguments, got {got}")]
    ArityMismatch {
        method: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failure of one server-side invocation.
///
/// `Protocol` means the frame never reached the target; `Invocation` wraps
/// the target's own failure so callers can tell a broken frame from a
/// refused operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum InvokeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    #[error("invocation failed: {detail}")]
    Invocation { detail: String },
}

impl InvokeError {
    pub fn invocation(detail: impl Into<String>) -> Self {
        Self::Invocation {
            detail: detail.into(),
        }
    }
}

impl From<InvokeError> for CallFailure {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::Protocol(violation) => CallFailure::protocol(violation.to_string()),
            InvokeError::Invocation { detail } => CallFailure::Invocation { detail },
        }
    }
}

/// Failure to fire a push event. Wiring failures are construction-time and
/// live in [`BuildError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FireError {
    #[error("event type {event_type} is not declared for this entity")]
    UnsupportedEventType { event_type: &'static str },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failure of a client-side stub call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum StubError {
    /// Local method-resolution or codec failure, caught on this side of the
    /// wire.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The server discarded the frame as malformed.
    #[error("server rejected call: {detail}")]
    Rejected { detail: String },

    /// The remote implementation refused the operation; the detail is the
    /// caller's error.
    #[error("remote invocation failed: {detail}")]
    Invocation { detail: String },

    /// The call never completed.
    #[error("transport error: {detail}")]
    Transport { detail: String },
}

impl From<CallFailure> for StubError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Protocol { detail } => Self::Rejected { detail },
            CallFailure::Invocation { detail } => Self::Invocation { detail },
            CallFailure::Transport { detail } => Self::Transport { detail },
            other => Self::Transport {
                detail: other.to_string(),
            },
        }
    }
}
