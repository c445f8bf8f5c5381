//! Entity-side push registry.
//!
//! An entity declares its event types up front and fires through an
//! [`EventFiring`] it owns; the invoker wires itself in as the
//! [`EventSink`] for every declared type at construction. The registry is
//! a fixed table of write-once slots: firing a declared but unwired type
//! is a quiet no-op (the entity is running without a push channel, e.g.
//! under test), firing an undeclared type is refused before anything is
//! encoded, and a second wiring of the same slot is refused outright.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use socle_entity::ClientHandle;

use crate::codec::{to_wire, WireValue};
use crate::contract::PushEvent;
use crate::error::{BuildError, FireError};
use crate::server::BroadcastOutcome;

/// Where encoded events go. The invoker's broadcast machinery implements
/// this; entities only ever talk to [`EventFiring`].
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Fan the event out to every subscribed client except the current
    /// invocation's caller, awaiting every delivery outcome.
    async fn broadcast(
        &self,
        event_type: &'static str,
        payload: WireValue,
    ) -> Result<BroadcastOutcome, FireError>;

    /// Like [`broadcast`](EventSink::broadcast), but `cancel` stops the
    /// wait early. Issued sends are never retracted.
    async fn broadcast_with_cancel(
        &self,
        event_type: &'static str,
        payload: WireValue,
        cancel: CancellationToken,
    ) -> Result<BroadcastOutcome, FireError>;

    /// Push the event to exactly `recipients`, with no delivery feedback.
    fn fire_and_forget(
        &self,
        event_type: &'static str,
        payload: WireValue,
        recipients: &[ClientHandle],
    ) -> Result<(), FireError>;
}

/// Implemented by targets that push events; hands the invoker the registry
/// to wire at construction.
pub trait EventSource {
    fn firing(&self) -> &EventFiring;
}

/// Per-entity push registry: a fixed set of declared event types, each
/// with one write-once sink slot.
pub struct EventFiring {
    declared: &'static [&'static str],
    slots: Vec<OnceLock<Arc<dyn EventSink>>>,
}

impl EventFiring {
    pub fn new(declared: &'static [&'static str]) -> Self {
        let slots = declared.iter().map(|_| OnceLock::new()).collect();
        Self { declared, slots }
    }

    pub fn declared(&self) -> &'static [&'static str] {
        self.declared
    }

    fn slot(&self, event_type: &str) -> Option<&OnceLock<Arc<dyn EventSink>>> {
        self.declared
            .iter()
            .position(|declared| *declared == event_type)
            .map(|i| &self.slots[i])
    }

    /// Wire a sink for `event_type`. One wiring per type; a second is
    /// refused, never silently replaced.
    pub fn register(
        &self,
        event_type: &'static str,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), BuildError> {
        let slot = self
            .slot(event_type)
            .ok_or(BuildError::UndeclaredEventType { event_type })?;
        slot.set(sink)
            .map_err(|_| BuildError::AlreadyWired { event_type })
    }

    /// Broadcast `event` to every subscriber except the current caller.
    pub async fn fire<E: PushEvent>(&self, event: &E) -> Result<BroadcastOutcome, FireError> {
        let slot = self.slot(E::EVENT_TYPE).ok_or(FireError::UnsupportedEventType {
            event_type: E::EVENT_TYPE,
        })?;
        let Some(sink) = slot.get() else {
            return Ok(BroadcastOutcome::default());
        };
        let payload = to_wire(event)?;
        sink.broadcast(E::EVENT_TYPE, payload).await
    }

    /// [`fire`](EventFiring::fire) with an early-out signal for the wait
    /// phase.
    pub async fn fire_with_cancel<E: PushEvent>(
        &self,
        event: &E,
        cancel: CancellationToken,
    ) -> Result<BroadcastOutcome, FireError> {
        let slot = self.slot(E::EVENT_TYPE).ok_or(FireError::UnsupportedEventType {
            event_type: E::EVENT_TYPE,
        })?;
        let Some(sink) = slot.get() else {
            return Ok(BroadcastOutcome::default());
        };
        let payload = to_wire(event)?;
        sink.broadcast_with_cancel(E::EVENT_TYPE, payload, cancel).await
    }

    /// Push `event` to exactly `recipients`, ignoring the subscriber set.
    pub fn fire_and_forget<E: PushEvent>(
        &self,
        event: &E,
        recipients: &[ClientHandle],
    ) -> Result<(), FireError> {
        let slot = self.slot(E::EVENT_TYPE).ok_or(FireError::UnsupportedEventType {
            event_type: E::EVENT_TYPE,
        })?;
        let Some(sink) = slot.get() else {
            return Ok(());
        };
        let payload = to_wire(event)?;
        sink.fire_and_forget(E::EVENT_TYPE, payload, recipients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::sync::Mutex;

    #[derive(Serialize)]
    struct Ping {
        n: u32,
    }

    impl PushEvent for Ping {
        const EVENT_TYPE: &'static str = "ping";
    }

    #[derive(Serialize)]
    struct Undeclared;

    impl PushEvent for Undeclared {
        const EVENT_TYPE: &'static str = "undeclared";
    }

    #[derive(Default)]
    struct RecordingSink {
        broadcasts: Mutex<Vec<(&'static str, WireValue)>>,
        targeted: Mutex<Vec<(&'static str, Vec<ClientHandle>)>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn broadcast(
            &self,
            event_type: &'static str,
            payload: WireValue,
        ) -> Result<BroadcastOutcome, FireError> {
            self.broadcasts
                .lock()
                .expect("broadcasts mutex poisoned")
                .push((event_type, payload));
            Ok(BroadcastOutcome {
                recipients: 1,
                delivered: 1,
                ..BroadcastOutcome::default()
            })
        }

        async fn broadcast_with_cancel(
            &self,
            event_type: &'static str,
            payload: WireValue,
            _cancel: CancellationToken,
        ) -> Result<BroadcastOutcome, FireError> {
            self.broadcast(event_type, payload).await
        }

        fn fire_and_forget(
            &self,
            event_type: &'static str,
            _payload: WireValue,
            recipients: &[ClientHandle],
        ) -> Result<(), FireError> {
            self.targeted
                .lock()
                .expect("targeted mutex poisoned")
                .push((event_type, recipients.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn fire_routes_through_the_wired_sink() {
        let firing = EventFiring::new(&["ping"]);
        let sink = Arc::new(RecordingSink::default());
        firing.register("ping", sink.clone()).expect("wire sink");

        let outcome = firing.fire(&Ping { n: 3 }).await.expect("fire ping");
        assert_eq!(outcome.delivered, 1);

        let seen = sink.broadcasts.lock().expect("broadcasts mutex poisoned");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "ping");
    }

    #[tokio::test]
    async fn cancellable_fire_reaches_the_sink() {
        let firing = EventFiring::new(&["ping"]);
        let sink = Arc::new(RecordingSink::default());
        firing.register("ping", sink.clone()).expect("wire sink");

        let outcome = firing
            .fire_with_cancel(&Ping { n: 1 }, CancellationToken::new())
            .await
            .expect("fire ping");
        assert_eq!(outcome.recipients, 1);
    }

    #[tokio::test]
    async fn unwired_slot_is_a_quiet_no_op() {
        let firing = EventFiring::new(&["ping"]);
        let outcome = firing.fire(&Ping { n: 1 }).await.expect("fire unwired");
        assert_eq!(outcome, BroadcastOutcome::default());
        firing
            .fire_and_forget(&Ping { n: 1 }, &[ClientHandle::new(1)])
            .expect("push unwired");
    }

    #[tokio::test]
    async fn undeclared_type_is_refused_before_any_send() {
        let firing = EventFiring::new(&["ping"]);
        let sink = Arc::new(RecordingSink::default());
        firing.register("ping", sink.clone()).expect("wire sink");

        assert!(matches!(
            firing.fire(&Undeclared).await,
            Err(FireError::UnsupportedEventType {
                event_type: "undeclared"
            })
        ));
        assert!(firing.fire_and_forget(&Undeclared, &[]).is_err());
        assert!(sink
            .broadcasts
            .lock()
            .expect("broadcasts mutex poisoned")
            .is_empty());
    }

    #[test]
    fn second_wiring_is_refused() {
        let firing = EventFiring::new(&["ping"]);
        let sink = Arc::new(RecordingSink::default());
        firing.register("ping", sink.clone()).expect("first wiring");
        assert!(matches!(
            firing.register("ping", sink),
            Err(BuildError::AlreadyWired { event_type: "ping" })
        ));
        assert!(matches!(
            firing.register("pong", Arc::new(RecordingSink::default())),
            Err(BuildError::UndeclaredEventType { event_type: "pong" })
        ));
    }
}
