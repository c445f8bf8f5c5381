use serde::{Deserialize, Serialize};

use crate::client::ClientHandle;

/// Failure of a single server-to-client push.
///
/// Delivery errors stay on the server side — fan-out machinery logs and
/// counts them per recipient, it never propagates them to the entity's
/// caller. Hence no serde here.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DeliveryError {
    #[error("{client} is not reachable")]
    Unreachable { client: ClientHandle },

    #[error("push channel to {client} closed")]
    ChannelClosed { client: ClientHandle },

    #[error("delivery rejected: {detail}")]
    Rejected { detail: String },
}

/// Failure of an entity invocation, as seen across the platform boundary.
///
/// The split matters to callers: `Protocol` and `Transport` mean the call
/// never ran to completion, while `Invocation` is the entity's own business
/// failure travelling back as a result. Serializable because it crosses the
/// wire alongside response payloads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CallFailure {
    #[error("protocol violation: {detail}")]
    Protocol { detail: String },

    #[error("invocation failed: {detail}")]
    Invocation { detail: String },

    #[error("transport error: {detail}")]
    Transport { detail: String },
}

impl CallFailure {
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    pub fn invocation(detail: impl Into<String>) -> Self {
        Self::Invocation {
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }
}
