//! Platform boundary traits for socle entities.
//!
//! This crate defines the seam between a server-resident entity and the
//! platform hosting it. The platform owns connections, replication, and
//! lifecycle; the entity owns behavior. Everything they exchange goes
//! through the types here:
//!
//! - **[`ClientHandle`]** — opaque identity of a connected client
//! - **[`ActiveEntity`]** — the surface the platform drives: inbound call
//!   payloads plus connect/disconnect notifications
//! - **[`ClientCommunicator`]** — the server-to-client push channel the
//!   platform provides to entities
//! - **[`EntityEndpoint`]** — the client-side call primitive (request
//!   payload in, response payload out)
//! - **[`CallFailure`]** / **[`DeliveryError`]** — typed outcomes crossing
//!   the boundary in each direction
//!
//! Dispatch, wire framing, and codecs live upstream in `socle-proxy`; this
//! crate stays dependency-light so platform adapters can implement the
//! traits without pulling in the dispatch machinery.

pub mod client;
pub mod communicator;
pub mod endpoint;
pub mod entity;
pub mod error;

pub use client::ClientHandle;
pub use communicator::ClientCommunicator;
pub use endpoint::EntityEndpoint;
pub use entity::ActiveEntity;
pub use error::{CallFailure, DeliveryError};
