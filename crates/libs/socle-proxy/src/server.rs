//! Server-side dispatch: decode, execute, encode, push.
//!
//! [`EntityInvoker`] is the glue between the hosting platform and a
//! hand-written [`EntityTarget`]. Inbound frames are decoded against the
//! contract's identifier table, dispatched inside a caller-context scope,
//! and the result is encoded back. The invoker also owns the push side:
//! a subscriber roster fed by connect/disconnect, caller-excluding
//! broadcast with per-recipient accounting, and targeted fire-and-forget.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use socle_entity::{ActiveEntity, CallFailure, ClientCommunicator, ClientHandle, DeliveryError};

use crate::codec::{from_wire, to_wire, Codec, WireValue};
use crate::contract::{ContractDescriptor, EventTable, MethodDescriptor, MethodTable, PushEvent};
use crate::error::{BuildError, CodecError, FireError, InvokeError, ProtocolViolation};
use crate::wire::{InvocationMessage, PushMessage};

pub mod context;
pub mod firing;

use firing::{EventSink, EventSource};

/// Server-side dispatch seam: one hand-written implementation per
/// contract, matched against the contract's descriptor.
#[async_trait]
pub trait EntityTarget: Send + Sync {
    fn descriptor(&self) -> &'static ContractDescriptor;

    /// Execute one decoded call. Caller-identity parameters come from
    /// [`MethodCall::caller`], never from the argument slots.
    async fn dispatch(&self, call: MethodCall) -> Result<WireValue, InvokeError>;
}

/// One decoded invocation, handed to [`EntityTarget::dispatch`].
pub struct MethodCall {
    pub method: &'static MethodDescriptor,
    pub args: Vec<WireValue>,
    pub caller: ClientHandle,
}

impl MethodCall {
    /// Decode argument slot `index` into its typed form. Slot positions
    /// follow the descriptor's parameter order.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, InvokeError> {
        let value = self.args.get(index).cloned().ok_or_else(|| {
            InvokeError::Protocol(ProtocolViolation::Codec(CodecError::Decode(format!(
                "argument slot {index} out of range for {}",
                self.method.name
            ))))
        })?;
        from_wire(value).map_err(|err| InvokeError::Protocol(ProtocolViolation::Codec(err)))
    }
}

/// Delivery accounting for one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Clients the event was issued to (subscribers minus the caller).
    pub recipients: usize,
    /// Sends that completed and reported success.
    pub delivered: usize,
    /// Sends that completed and reported failure.
    pub failed: usize,
    /// Sends still running when the wait was cancelled.
    pub unresolved: usize,
    /// Whether the wait ended early on a cancellation signal.
    pub cancelled: bool,
}

/// Subscriber set shared by the invoker and its broadcaster. Membership
/// only; connection lifecycle stays with the platform.
#[derive(Default)]
struct ClientRoster {
    clients: Mutex<HashSet<ClientHandle>>,
}

impl ClientRoster {
    fn add(&self, client: ClientHandle) -> bool {
        self.clients
            .lock()
            .expect("roster mutex poisoned")
            .insert(client)
    }

    fn remove(&self, client: ClientHandle) -> bool {
        self.clients
            .lock()
            .expect("roster mutex poisoned")
            .remove(&client)
    }

    /// Sorted snapshot, minus the excluded handle. Sorting keeps issuance
    /// order stable run to run.
    fn snapshot_without(&self, excluded: Option<ClientHandle>) -> Vec<ClientHandle> {
        let guard = self.clients.lock().expect("roster mutex poisoned");
        let mut subscribers: Vec<ClientHandle> = guard
            .iter()
            .copied()
            .filter(|client| Some(*client) != excluded)
            .collect();
        drop(guard);
        subscribers.sort_unstable();
        subscribers
    }
}

/// The push half: encodes once, issues one send task per recipient, and
/// accounts for every outcome. Wired into the target's [`EventFiring`]
/// registry as its [`EventSink`].
struct Broadcaster {
    codec: Arc<dyn Codec>,
    events: EventTable,
    communicator: Arc<dyn ClientCommunicator>,
    roster: Arc<ClientRoster>,
}

impl Broadcaster {
    async fn fan_out(
        &self,
        event_type: &'static str,
        payload: WireValue,
        cancel: Option<CancellationToken>,
    ) -> Result<BroadcastOutcome, FireError> {
        let Some(event_id) = self.events.id_for(event_type) else {
            return Err(FireError::UnsupportedEventType { event_type });
        };
        let body = self.codec.encode_value(&payload)?;
        let frame = PushMessage::new(event_id, body).encode();

        let caller = context::current_caller();
        let recipients = self.roster.snapshot_without(caller);

        let mut outcome = BroadcastOutcome {
            recipients: recipients.len(),
            ..BroadcastOutcome::default()
        };
        if recipients.is_empty() {
            return Ok(outcome);
        }

        // Issue every send before waiting on any of them.
        let mut pending = Vec::with_capacity(recipients.len());
        for client in recipients {
            let communicator = Arc::clone(&self.communicator);
            let bytes = frame.clone();
            pending.push((
                client,
                tokio::spawn(async move { communicator.send(client, bytes).await }),
            ));
        }

        Self::wait_for_sends(pending, cancel, &mut outcome).await;
        Ok(outcome)
    }

    /// Await each send in issuance order. On cancellation, finished sends
    /// are still accounted for; unfinished ones keep running detached and
    /// are counted as unresolved.
    async fn wait_for_sends(
        pending: Vec<(ClientHandle, JoinHandle<Result<(), DeliveryError>>)>,
        cancel: Option<CancellationToken>,
        outcome: &mut BroadcastOutcome,
    ) {
        let mut iter = pending.into_iter();
        while let Some((client, mut handle)) = iter.next() {
            let Some(token) = cancel.as_ref() else {
                let result = handle.await;
                Self::record(client, result, outcome);
                continue;
            };

            let finished = tokio::select! {
                biased;
                result = &mut handle => Some(result),
                () = token.cancelled() => None,
            };
            match finished {
                Some(result) => Self::record(client, result, outcome),
                None => {
                    outcome.cancelled = true;
                    if handle.is_finished() {
                        Self::record(client, handle.await, outcome);
                    } else {
                        outcome.unresolved += 1;
                    }
                    for (client, rest) in iter.by_ref() {
                        if rest.is_finished() {
                            Self::record(client, rest.await, outcome);
                        } else {
                            outcome.unresolved += 1;
                        }
                    }
                    return;
                }
            }
        }
    }

    fn record(
        client: ClientHandle,
        result: Result<Result<(), DeliveryError>, JoinError>,
        outcome: &mut BroadcastOutcome,
    ) {
        match result {
            Ok(Ok(())) => outcome.delivered += 1,
            Ok(Err(err)) => {
                outcome.failed += 1;
                log::warn!("broadcast: push to {client} failed: {err}");
            }
            Err(err) => {
                outcome.failed += 1;
                log::warn!("broadcast: push task for {client} failed: {err}");
            }
        }
    }

    fn push_to(
        &self,
        event_type: &'static str,
        payload: WireValue,
        recipients: &[ClientHandle],
    ) -> Result<(), FireError> {
        let Some(event_id) = self.events.id_for(event_type) else {
            return Err(FireError::UnsupportedEventType { event_type });
        };
        let body = self.codec.encode_value(&payload)?;
        let frame = PushMessage::new(event_id, body).encode();
        for &client in recipients {
            self.communicator.send_no_response(client, frame.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl EventSink for Broadcaster {
    async fn broadcast(
        &self,
        event_type: &'static str,
        payload: WireValue,
    ) -> Result<BroadcastOutcome, FireError> {
        self.fan_out(event_type, payload, None).await
    }

    async fn broadcast_with_cancel(
        &self,
        event_type: &'static str,
        payload: WireValue,
        cancel: CancellationToken,
    ) -> Result<BroadcastOutcome, FireError> {
        self.fan_out(event_type, payload, Some(cancel)).await
    }

    fn fire_and_forget(
        &self,
        event_type: &'static str,
        payload: WireValue,
        recipients: &[ClientHandle],
    ) -> Result<(), FireError> {
        self.push_to(event_type, payload, recipients)
    }
}

/// Server-side invoker for one entity: the platform hands it raw frames
/// and lifecycle notifications, the target gets typed calls.
pub struct EntityInvoker<T> {
    target: Arc<T>,
    codec: Arc<dyn Codec>,
    methods: MethodTable,
    roster: Arc<ClientRoster>,
    broadcaster: Option<Arc<Broadcaster>>,
}

impl<T: EntityTarget> EntityInvoker<T> {
    /// Invoker without a push channel: calls only.
    pub fn new(target: Arc<T>, codec: Arc<dyn Codec>) -> Result<Self, BuildError> {
        let methods = MethodTable::build(target.descriptor())?;
        Ok(Self {
            target,
            codec,
            methods,
            roster: Arc::new(ClientRoster::default()),
            broadcaster: None,
        })
    }

    pub fn contract(&self) -> &'static str {
        self.methods.contract()
    }

    pub fn target(&self) -> &Arc<T> {
        &self.target
    }

    /// Handle one inbound frame from `caller`.
    pub async fn invoke(
        &self,
        caller: ClientHandle,
        payload: &[u8],
    ) -> Result<Vec<u8>, InvokeError> {
        let frame = InvocationMessage::decode(payload)?;
        let method = self.methods.method_by_id(frame.method_id)?;
        let args = self
            .codec
            .decode_values(&frame.args, method.arity())
            .map_err(ProtocolViolation::from)?;

        let call = MethodCall {
            method,
            args,
            caller,
        };
        let result = context::scope(caller, self.target.dispatch(call)).await?;

        let bytes = self
            .codec
            .encode_value(&result)
            .map_err(ProtocolViolation::from)?;
        Ok(bytes)
    }

    /// Subscribe `client` to broadcasts.
    pub fn add_client(&self, client: ClientHandle) {
        if !self.roster.add(client) {
            log::debug!("invoker({}): {client} already subscribed", self.contract());
        }
    }

    /// Drop `client` from the subscriber set. In-flight sends to it are
    /// not retracted.
    pub fn remove_client(&self, client: ClientHandle) {
        if !self.roster.remove(client) {
            log::debug!("invoker({}): {client} was not subscribed", self.contract());
        }
    }

    /// Fan `event` out to every subscribed client except the current
    /// invocation's caller, awaiting every delivery outcome.
    pub async fn broadcast<E: PushEvent>(&self, event: &E) -> Result<BroadcastOutcome, FireError> {
        let Some(broadcaster) = &self.broadcaster else {
            return Err(FireError::UnsupportedEventType {
                event_type: E::EVENT_TYPE,
            });
        };
        let payload = to_wire(event)?;
        broadcaster.fan_out(E::EVENT_TYPE, payload, None).await
    }

    /// Like [`broadcast`](EntityInvoker::broadcast), but `cancel` stops
    /// the wait early. Issued sends are never retracted: finished ones are
    /// still counted, unfinished ones continue detached and are reported
    /// as unresolved.
    pub async fn broadcast_with_cancel<E: PushEvent>(
        &self,
        event: &E,
        cancel: CancellationToken,
    ) -> Result<BroadcastOutcome, FireError> {
        let Some(broadcaster) = &self.broadcaster else {
            return Err(FireError::UnsupportedEventType {
                event_type: E::EVENT_TYPE,
            });
        };
        let payload = to_wire(event)?;
        broadcaster
            .fan_out(E::EVENT_TYPE, payload, Some(cancel))
            .await
    }

    /// Push `event` to exactly `recipients`, regardless of subscription,
    /// with no delivery feedback.
    pub fn fire_and_forget<E: PushEvent>(
        &self,
        event: &E,
        recipients: &[ClientHandle],
    ) -> Result<(), FireError> {
        let Some(broadcaster) = &self.broadcaster else {
            return Err(FireError::UnsupportedEventType {
                event_type: E::EVENT_TYPE,
            });
        };
        let payload = to_wire(event)?;
        broadcaster.push_to(E::EVENT_TYPE, payload, recipients)
    }
}

impl<T: EntityTarget + EventSource> EntityInvoker<T> {
    /// Invoker with a push channel: builds the event table and wires
    /// itself into the target's firing registry for every declared type.
    pub fn with_events(
        target: Arc<T>,
        codec: Arc<dyn Codec>,
        communicator: Arc<dyn ClientCommunicator>,
        event_types: &'static [&'static str],
    ) -> Result<Self, BuildError> {
        let methods = MethodTable::build(target.descriptor())?;
        let events = EventTable::build(event_types)?;
        let roster = Arc::new(ClientRoster::default());
        let broadcaster = Arc::new(Broadcaster {
            codec: Arc::clone(&codec),
            events,
            communicator,
            roster: Arc::clone(&roster),
        });

        for &event_type in event_types {
            target.firing().register(event_type, broadcaster.clone())?;
        }

        Ok(Self {
            target,
            codec,
            methods,
            roster,
            broadcaster: Some(broadcaster),
        })
    }
}

#[async_trait]
impl<T: EntityTarget + 'static> ActiveEntity for EntityInvoker<T> {
    async fn invoke(&self, caller: ClientHandle, payload: &[u8]) -> Result<Vec<u8>, CallFailure> {
        EntityInvoker::invoke(self, caller, payload)
            .await
            .map_err(CallFailure::from)
    }

    fn connected(&self, client: ClientHandle) {
        self.add_client(client);
    }

    fn disconnected(&self, client: ClientHandle) {
        self.remove_client(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MsgpackCodec;
    use crate::contract::{ParamSpec, ReturnSpec};

    static ECHO_METHODS: &[MethodDescriptor] = &[
        MethodDescriptor {
            name: "echo",
            params: &[ParamSpec::value("value", "string")],
            returns: ReturnSpec::Value("string"),
        },
        MethodDescriptor {
            name: "whoami",
            params: &[ParamSpec::caller("me")],
            returns: ReturnSpec::Value("u64"),
        },
        MethodDescriptor {
            name: "fail",
            params: &[],
            returns: ReturnSpec::Unit,
        },
    ];

    static ECHO: ContractDescriptor = ContractDescriptor {
        name: "echo",
        methods: ECHO_METHODS,
    };

    struct EchoTarget;

    #[async_trait]
    impl EntityTarget for EchoTarget {
        fn descriptor(&self) -> &'static ContractDescriptor {
            &ECHO
        }

        async fn dispatch(&self, call: MethodCall) -> Result<WireValue, InvokeError> {
            match call.method.name {
                "echo" => {
                    let value: String = call.arg(0)?;
                    Ok(WireValue::from(value))
                }
                "whoami" => Ok(WireValue::from(call.caller.raw())),
                "fail" => Err(InvokeError::invocation("always fails")),
                other => Err(InvokeError::invocation(format!("no such method {other}"))),
            }
        }
    }

    fn invoker() -> EntityInvoker<EchoTarget> {
        EntityInvoker::new(Arc::new(EchoTarget), Arc::new(MsgpackCodec)).expect("build invoker")
    }

    fn frame(invoker: &EntityInvoker<EchoTarget>, method: &str, args: &[WireValue]) -> Vec<u8> {
        let (id, _) = invoker.methods.method_by_name(method).expect("resolve");
        let body = MsgpackCodec.encode_values(args).expect("encode args");
        InvocationMessage::new(id, body).encode()
    }

    #[tokio::test]
    async fn dispatches_and_encodes_the_result() {
        let invoker = invoker();
        let payload = frame(&invoker, "echo", &[WireValue::from("hi")]);
        let reply = invoker
            .invoke(ClientHandle::new(1), &payload)
            .await
            .expect("invoke echo");
        let value = MsgpackCodec.decode_value(&reply).expect("decode reply");
        assert_eq!(value, WireValue::from("hi"));
    }

    #[tokio::test]
    async fn caller_identity_comes_from_the_connection() {
        let invoker = invoker();
        // The frame carries a nil placeholder for the caller slot; the
        // dispatched call still sees the connection's handle.
        let payload = frame(&invoker, "whoami", &[WireValue::Nil]);
        let reply = invoker
            .invoke(ClientHandle::new(42), &payload)
            .await
            .expect("invoke whoami");
        let value = MsgpackCodec.decode_value(&reply).expect("decode reply");
        assert_eq!(value, WireValue::from(42u64));
    }

    #[tokio::test]
    async fn unknown_method_id_is_a_protocol_violation() {
        let invoker = invoker();
        let payload = InvocationMessage::new(9, Vec::new()).encode();
        assert!(matches!(
            invoker.invoke(ClientHandle::new(1), &payload).await,
            Err(InvokeError::Protocol(ProtocolViolation::UnknownMethodId {
                id: 9,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn empty_frame_is_a_protocol_violation() {
        let invoker = invoker();
        assert!(matches!(
            invoker.invoke(ClientHandle::new(1), &[]).await,
            Err(InvokeError::Protocol(ProtocolViolation::ShortFrame { len: 0 }))
        ));
    }

    #[tokio::test]
    async fn arity_mismatch_is_caught_before_dispatch() {
        let invoker = invoker();
        let (id, _) = invoker.methods.method_by_name("echo").expect("resolve");
        let body = MsgpackCodec
            .encode_values(&[WireValue::from("a"), WireValue::from("b")])
            .expect("encode args");
        let payload = InvocationMessage::new(id, body).encode();
        assert!(matches!(
            invoker.invoke(ClientHandle::new(1), &payload).await,
            Err(InvokeError::Protocol(ProtocolViolation::Codec(_)))
        ));
    }

    #[tokio::test]
    async fn business_failures_keep_their_class() {
        let invoker = invoker();
        let payload = frame(&invoker, "fail", &[]);
        let err = invoker
            .invoke(ClientHandle::new(1), &payload)
            .await
            .expect_err("fail method");
        assert_eq!(
            err,
            InvokeError::Invocation {
                detail: "always fails".into()
            }
        );
    }

    #[tokio::test]
    async fn broadcast_without_events_is_refused() {
        #[derive(serde::Serialize)]
        struct Tick;
        impl PushEvent for Tick {
            const EVENT_TYPE: &'static str = "tick";
        }

        let invoker = invoker();
        assert!(matches!(
            invoker.broadcast(&Tick).await,
            Err(FireError::UnsupportedEventType { event_type: "tick" })
        ));
        assert!(invoker.fire_and_forget(&Tick, &[]).is_err());
    }

    #[test]
    fn roster_tracks_membership() {
        let roster = ClientRoster::default();
        assert!(roster.add(ClientHandle::new(1)));
        assert!(!roster.add(ClientHandle::new(1)));
        assert!(roster.add(ClientHandle::new(2)));

        let all = roster.snapshot_without(None);
        assert_eq!(all, vec![ClientHandle::new(1), ClientHandle::new(2)]);

        let minus_one = roster.snapshot_without(Some(ClientHandle::new(1)));
        assert_eq!(minus_one, vec![ClientHandle::new(2)]);

        assert!(roster.remove(ClientHandle::new(1)));
        assert!(!roster.remove(ClientHandle::new(1)));
    }
}
