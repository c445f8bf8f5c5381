//! Client-side call stub and push dispatch.
//!
//! [`EntityStub`] is the generic call core: per-contract adapter types
//! wrap it with typed methods. It resolves methods against the same
//! deterministic table the server builds, redacts caller-identity slots,
//! and frames the call for an [`EntityEndpoint`]. [`PushDispatcher`] is
//! the inbound half: it maps event ids back to types and feeds registered
//! listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;

use socle_entity::EntityEndpoint;

use crate::codec::{from_wire, Codec, WireValue};
use crate::contract::{ContractDescriptor, EventTable, MethodTable, PushEvent};
use crate::error::{BuildError, FireError, ProtocolViolation, StubError};
use crate::wire::{InvocationMessage, PushMessage};

/// Generic call stub for one contract.
pub struct EntityStub<E> {
    methods: MethodTable,
    codec: Arc<dyn Codec>,
    endpoint: E,
}

impl<E: EntityEndpoint> EntityStub<E> {
    pub fn new(
        contract: &'static ContractDescriptor,
        endpoint: E,
        codec: Arc<dyn Codec>,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            methods: MethodTable::build(contract)?,
            codec,
            endpoint,
        })
    }

    pub fn contract(&self) -> &'static str {
        self.methods.contract()
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Invoke `method` with `args`, returning the decoded result value.
    ///
    /// Caller-identity slots are overwritten with the nil placeholder no
    /// matter what was passed; the server fills them from the connection
    /// the call arrives on. Unknown methods and arity mismatches fail
    /// here, before anything touches the wire.
    pub async fn call(
        &self,
        method: &str,
        mut args: Vec<WireValue>,
    ) -> Result<WireValue, StubError> {
        let (id, descriptor) = self.methods.method_by_name(method)?;
        if args.len() != descriptor.arity() {
            return Err(StubError::Protocol(ProtocolViolation::ArityMismatch {
                method: descriptor.name,
                expected: descriptor.arity(),
                got: args.len(),
            }));
        }
        for (slot, param) in args.iter_mut().zip(descriptor.params) {
            if param.is_caller() {
                *slot = WireValue::Nil;
            }
        }

        let body = self
            .codec
            .encode_values(&args)
            .map_err(ProtocolViolation::from)?;
        let frame = InvocationMessage::new(id, body).encode();

        let reply = self.endpoint.call(frame).await?;
        let value = self
            .codec
            .decode_value(&reply)
            .map_err(ProtocolViolation::from)?;
        Ok(value)
    }

    /// [`call`](EntityStub::call) for unit-returning methods; the reply
    /// value is checked for decodability and discarded.
    pub async fn call_unit(&self, method: &str, args: Vec<WireValue>) -> Result<(), StubError> {
        self.call(method, args).await.map(|_| ())
    }
}

type Listener = Arc<dyn Fn(&WireValue) + Send + Sync>;

/// Routes inbound push frames to typed listeners.
///
/// Unlike the server-side firing registry, any number of listeners may
/// watch one event type here. A payload a listener cannot decode is
/// logged and dropped for that listener only.
pub struct PushDispatcher {
    events: EventTable,
    codec: Arc<dyn Codec>,
    listeners: Mutex<HashMap<&'static str, Vec<Listener>>>,
}

impl PushDispatcher {
    pub fn new(
        event_types: &'static [&'static str],
        codec: Arc<dyn Codec>,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            events: EventTable::build(event_types)?,
            codec,
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// Register a typed listener for `E`. Registration for a type outside
    /// the declared table is refused — it could never fire.
    pub fn register<E, F>(&self, listener: F) -> Result<(), FireError>
    where
        E: PushEvent + DeserializeOwned + 'static,
        F: Fn(E) + Send + Sync + 'static,
    {
        if self.events.id_for(E::EVENT_TYPE).is_none() {
            return Err(FireError::UnsupportedEventType {
                event_type: E::EVENT_TYPE,
            });
        }
        let wrapped: Listener = Arc::new(move |value: &WireValue| {
            match from_wire::<E>(value.clone()) {
                Ok(event) => listener(event),
                Err(err) => log::warn!("push: {} payload decode failed: {err}", E::EVENT_TYPE),
            }
        });
        self.listeners
            .lock()
            .expect("listeners mutex poisoned")
            .entry(E::EVENT_TYPE)
            .or_default()
            .push(wrapped);
        Ok(())
    }

    /// Route one inbound push frame. Unknown event ids are a protocol
    /// violation; a declared type with no listeners is quietly dropped.
    pub fn dispatch(&self, frame: &[u8]) -> Result<(), ProtocolViolation> {
        let push = PushMessage::decode(frame)?;
        let event_type = self.events.event_type_for(push.event_id)?;
        let payload = self.codec.decode_value(&push.payload)?;

        let watching: Vec<Listener> = {
            let guard = self.listeners.lock().expect("listeners mutex poisoned");
            guard.get(event_type).cloned().unwrap_or_default()
        };
        if watching.is_empty() {
            log::debug!("push: no listener for {event_type}, dropping");
            return Ok(());
        }
        for listener in &watching {
            listener(&payload);
        }
        Ok(())
    }
}
