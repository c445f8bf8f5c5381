//! The shared coordination contract: methods, permits, events, and the
//! service trait both sides implement.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use socle_entity::ClientHandle;
use socle_proxy::{ContractDescriptor, MethodDescriptor, ParamSpec, PushEvent, ReturnSpec};

/// Method names, spelled once for the server target and the client stub.
pub mod methods {
    pub const ENLIST: &str = "enlist";
    pub const ACCEPT: &str = "accept";
    pub const DELIST: &str = "delist";
}

static METHODS: &[MethodDescriptor] = &[
    MethodDescriptor {
        name: methods::ENLIST,
        params: &[
            ParamSpec::value("subject", "string"),
            ParamSpec::caller("candidate"),
        ],
        returns: ReturnSpec::Value("permit?"),
    },
    MethodDescriptor {
        name: methods::ACCEPT,
        params: &[
            ParamSpec::value("subject", "string"),
            ParamSpec::value("permit", "u64"),
        ],
        returns: ReturnSpec::Unit,
    },
    MethodDescriptor {
        name: methods::DELIST,
        params: &[
            ParamSpec::value("subject", "string"),
            ParamSpec::caller("candidate"),
        ],
        returns: ReturnSpec::Unit,
    },
];

/// Contract shared by every coordination participant.
pub static COORDINATION_CONTRACT: ContractDescriptor = ContractDescriptor {
    name: "socle/coordination",
    methods: METHODS,
};

/// Leadership ticket for one subject. Minted server-side at enlist time;
/// a candidate must present the exact permit it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permit(u64);

impl Permit {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permit#{}", self.0)
    }
}

/// Broadcast to every other client when a candidate accepts leadership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderElected {
    pub subject: String,
}

impl PushEvent for LeaderElected {
    const EVENT_TYPE: &'static str = "leader_elected";
}

/// Pushed to exactly one candidate when leadership falls to it after the
/// previous leader delists or disconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitIssued {
    pub subject: String,
    pub permit: Permit,
}

impl PushEvent for PermitIssued {
    const EVENT_TYPE: &'static str = "permit_issued";
}

/// Declared push events, in the order every side agrees on.
pub static COORDINATION_EVENTS: &[&str] =
    &[LeaderElected::EVENT_TYPE, PermitIssued::EVENT_TYPE];

/// Failures of coordination operations, as participants see them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[non_exhaustive]
pub enum CoordinationError {
    /// The subject has no election on the server.
    #[error("no election for subject {subject}")]
    UnknownSubject { subject: String },

    /// The presented permit does not belong to the current head candidate.
    #[error("stale permit for subject {subject}")]
    StalePermit { subject: String },

    /// The server ran the call and refused it.
    #[error("server refused: {detail}")]
    Remote { detail: String },

    /// The call never ran: stub, codec, or transport failure.
    #[error("proxy failure: {detail}")]
    Proxy { detail: String },
}

/// What a coordination participant can do. The server entity implements
/// this against its election state; the client stub implements it over
/// the wire.
///
/// `candidate` arguments are caller-identity slots: whatever a client
/// passes is struck from the wire and the server substitutes the handle
/// of the connection the call arrived on.
#[async_trait]
pub trait CoordinationService: Send + Sync {
    /// Join the election for `subject`. `Some(permit)` means the caller is
    /// now head of the queue and may accept leadership.
    async fn enlist(
        &self,
        subject: &str,
        candidate: ClientHandle,
    ) -> Result<Option<Permit>, CoordinationError>;

    /// Confirm leadership of `subject` with an issued permit.
    async fn accept(&self, subject: &str, permit: Permit) -> Result<(), CoordinationError>;

    /// Withdraw from the election for `subject`. Withdrawing the leader
    /// promotes the next candidate in line.
    async fn delist(
        &self,
        subject: &str,
        candidate: ClientHandle,
    ) -> Result<(), CoordinationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_declares_a_caller_slot_on_enlist_and_delist() {
        for name in [methods::ENLIST, methods::DELIST] {
            let method = COORDINATION_CONTRACT
                .methods
                .iter()
                .find(|method| method.name == name)
                .expect("method declared");
            assert!(method.params[1].is_caller());
            assert!(!method.params[0].is_caller());
        }
    }

    #[test]
    fn permits_survive_the_wire() {
        let issued = PermitIssued {
            subject: "lock-a".to_string(),
            permit: Permit::new(41),
        };
        let value = socle_proxy::to_wire(&issued).expect("encode");
        let back: PermitIssued = socle_proxy::from_wire(value).expect("decode");
        assert_eq!(back, issued);
        assert_eq!(back.permit.raw(), 41);
    }

    #[test]
    fn errors_read_like_sentences() {
        let err = CoordinationError::StalePermit {
            subject: "lock-a".to_string(),
        };
        assert_eq!(err.to_string(), "stale permit for subject lock-a");
        assert_eq!(Permit::new(7).to_string(), "permit#7");
    }
}
