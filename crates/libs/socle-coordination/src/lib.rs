//! # socle-coordination
//!
//! Leader election over the socle dispatch core, and the worked example
//! of wiring an entity end to end: contract descriptor, server target,
//! push events, and typed client stub.
//!
//! One election runs per subject string. Candidates enlist and queue up
//! in arrival order; the head of the queue holds a permit it must accept
//! to lead. When the leader delists or its connection drops, the next
//! candidate is promoted and learns of its permit through a push aimed
//! at it alone. Accepting leadership is announced to every other client.
//!
//! Identity is never taken from arguments: the enlist and delist methods
//! declare caller slots, so the server works with the handle of the
//! connection a call arrived on, whatever the client sent.
//!
//! # Crate family
//!
//! - `socle-entity` — platform boundary traits the entity plugs into
//! - `socle-proxy` — the dispatch core underneath
//! - `socle-coordination` — this crate

pub mod contract;
pub mod elector;
pub mod entity;
pub mod stub;

pub use contract::{
    CoordinationError, CoordinationService, LeaderElected, Permit, PermitIssued,
    COORDINATION_CONTRACT, COORDINATION_EVENTS,
};
pub use elector::{DelistSink, LeaderElector, SinkAlreadyWired};
pub use entity::{
    CoordinationBuildError, CoordinationEntity, CoordinationEntityService, ServerCoordination,
    ENTITY_TYPE, VERSION,
};
pub use stub::CoordinationStub;
