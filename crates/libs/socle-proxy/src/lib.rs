//! # socle-proxy
//!
//! Dispatch core for server-resident entities: deterministic identifier
//! tables, one-byte-header wire frames, the server-side invoker, and the
//! client-side call stub.
//!
//! Client and server never exchange metadata. Both sides build the same
//! tables from the same static contract descriptor ([`contract`]), frames
//! carry a single identifier byte plus a codec-encoded body ([`wire`]),
//! and the byte format itself is a strategy ([`codec`]) with msgpack as
//! the default.
//!
//! ```text
//! EntityStub::call                               EntityInvoker::invoke
//!   resolve method id                              resolve method by id
//!   redact caller slots      ──[id][args...]──►    decode args
//!   encode argument tuple                          dispatch in caller scope
//!   decode result value      ◄──[result....]──     encode result value
//! ```
//!
//! Pushes run the other way: the entity fires a typed event through its
//! [`server::firing::EventFiring`] registry, the invoker fans the encoded
//! frame out to every subscriber except the invocation's caller, and a
//! client-side [`client::PushDispatcher`] routes it to typed listeners.
//!
//! # Crate family
//!
//! - `socle-entity` — platform boundary traits this crate builds on
//! - `socle-proxy` — this crate
//! - `socle-coordination` — leader-election entity built on this core

pub mod client;
pub mod codec;
pub mod contract;
pub mod error;
pub mod local;
pub mod server;
pub mod wire;

pub use client::{EntityStub, PushDispatcher};
pub use codec::{from_wire, to_wire, Codec, MsgpackCodec, WireValue};
pub use contract::{
    ContractDescriptor, EventTable, MethodDescriptor, MethodTable, ParamSpec, PushEvent,
    ReturnSpec, ID_SPACE,
};
pub use error::{BuildError, CodecError, FireError, InvokeError, ProtocolViolation, StubError};
pub use local::{LocalCommunicator, LocalEndpoint};
pub use server::context::current_caller;
pub use server::firing::{EventFiring, EventSink, EventSource};
pub use server::{BroadcastOutcome, EntityInvoker, EntityTarget, MethodCall};
pub use wire::{InvocationMessage, PushMessage};
