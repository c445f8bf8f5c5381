//! Server side of coordination: the dispatch target, the fully wired
//! active entity, and the platform-facing service factory.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::Serialize;

use socle_entity::{ActiveEntity, CallFailure, ClientCommunicator, ClientHandle};
use socle_proxy::{
    to_wire, BuildError, ContractDescriptor, EntityInvoker, EntityTarget, EventFiring,
    EventSource, InvokeError, MethodCall, MsgpackCodec, ProtocolViolation, WireValue,
};

use crate::contract::{
    methods, CoordinationError, CoordinationService, LeaderElected, Permit, PermitIssued,
    COORDINATION_CONTRACT, COORDINATION_EVENTS,
};
use crate::elector::{DelistSink, LeaderElector, SinkAlreadyWired};

/// Entity-type string the coordination service answers to.
pub const ENTITY_TYPE: &str = "socle/coordination";

/// Version of the coordination entity implementation.
pub const VERSION: u64 = 1;

/// Failure to assemble the coordination entity stack.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoordinationBuildError {
    #[error(transparent)]
    Dispatch(#[from] BuildError),

    #[error(transparent)]
    Sink(#[from] SinkAlreadyWired),

    /// Coordination takes no configuration; any non-empty blob is a
    /// deployment mistake.
    #[error("coordination takes no configuration, got {len} bytes")]
    UnexpectedConfig { len: usize },
}

/// The contract implementation living on the server. Election state sits
/// in the elector; pushes leave through the firing table.
pub struct ServerCoordination {
    elector: Arc<LeaderElector>,
    firing: EventFiring,
}

impl ServerCoordination {
    pub fn new(elector: Arc<LeaderElector>) -> Self {
        Self {
            elector,
            firing: EventFiring::new(COORDINATION_EVENTS),
        }
    }
}

#[async_trait]
impl CoordinationService for ServerCoordination {
    async fn enlist(
        &self,
        subject: &str,
        candidate: ClientHandle,
    ) -> Result<Option<Permit>, CoordinationError> {
        Ok(self.elector.enlist(subject, candidate))
    }

    async fn accept(&self, subject: &str, permit: Permit) -> Result<(), CoordinationError> {
        self.elector.accept(subject, permit)?;
        let event = LeaderElected {
            subject: subject.to_string(),
        };
        if let Err(err) = self.firing.fire(&event).await {
            log::warn!("coordination: leader_elected push failed: {err}");
        }
        Ok(())
    }

    async fn delist(
        &self,
        subject: &str,
        candidate: ClientHandle,
    ) -> Result<(), CoordinationError> {
        self.elector.delist(subject, candidate);
        Ok(())
    }
}

impl EventSource for ServerCoordination {
    fn firing(&self) -> &EventFiring {
        &self.firing
    }
}

#[async_trait]
impl EntityTarget for ServerCoordination {
    fn descriptor(&self) -> &'static ContractDescriptor {
        &COORDINATION_CONTRACT
    }

    async fn dispatch(&self, call: MethodCall) -> Result<WireValue, InvokeError> {
        match call.method.name {
            methods::ENLIST => {
                let subject: String = call.arg(0)?;
                let permit = self
                    .enlist(&subject, call.caller)
                    .await
                    .map_err(refusal)?;
                encode_reply(&permit)
            }
            methods::ACCEPT => {
                let subject: String = call.arg(0)?;
                let permit: Permit = call.arg(1)?;
                self.accept(&subject, permit).await.map_err(refusal)?;
                Ok(WireValue::Nil)
            }
            methods::DELIST => {
                let subject: String = call.arg(0)?;
                self.delist(&subject, call.caller).await.map_err(refusal)?;
                Ok(WireValue::Nil)
            }
            other => Err(InvokeError::Protocol(ProtocolViolation::UnknownMethod {
                contract: COORDINATION_CONTRACT.name,
                name: other.to_string(),
            })),
        }
    }
}

fn refusal(err: CoordinationError) -> InvokeError {
    InvokeError::invocation(err.to_string())
}

fn encode_reply<T: Serialize>(value: &T) -> Result<WireValue, InvokeError> {
    to_wire(value).map_err(|err| InvokeError::Protocol(err.into()))
}

/// Hands a freshly promoted candidate its permit over the push channel.
/// Holds the invoker weakly: the invoker owns the target, which owns the
/// elector, which owns this sink.
struct PermitNotifier {
    invoker: Weak<EntityInvoker<ServerCoordination>>,
}

impl DelistSink for PermitNotifier {
    fn promoted(&self, subject: &str, candidate: ClientHandle, permit: Permit) {
        let Some(invoker) = self.invoker.upgrade() else {
            log::debug!("coordination: invoker gone, dropping permit for {subject}");
            return;
        };
        let event = PermitIssued {
            subject: subject.to_string(),
            permit,
        };
        if let Err(err) = invoker.fire_and_forget(&event, &[candidate]) {
            log::warn!("coordination: permit push to {candidate} failed: {err}");
        }
    }
}

/// Fully wired coordination entity: invoker, elector, and the promotion
/// path that hands permits to successors.
pub struct CoordinationEntity {
    invoker: Arc<EntityInvoker<ServerCoordination>>,
    elector: Arc<LeaderElector>,
}

impl CoordinationEntity {
    pub fn new(
        communicator: Arc<dyn ClientCommunicator>,
    ) -> Result<Self, CoordinationBuildError> {
        Self::with_elector(Arc::new(LeaderElector::new()), communicator)
    }

    /// Build around an existing elector, for callers that pre-seed or
    /// inspect election state directly.
    pub fn with_elector(
        elector: Arc<LeaderElector>,
        communicator: Arc<dyn ClientCommunicator>,
    ) -> Result<Self, CoordinationBuildError> {
        let target = Arc::new(ServerCoordination::new(Arc::clone(&elector)));
        let invoker = Arc::new(EntityInvoker::with_events(
            target,
            Arc::new(MsgpackCodec),
            communicator,
            COORDINATION_EVENTS,
        )?);
        elector.set_delist_sink(Arc::new(PermitNotifier {
            invoker: Arc::downgrade(&invoker),
        }))?;
        Ok(Self { invoker, elector })
    }

    pub fn invoker(&self) -> &Arc<EntityInvoker<ServerCoordination>> {
        &self.invoker
    }

    pub fn elector(&self) -> &Arc<LeaderElector> {
        &self.elector
    }
}

#[async_trait]
impl ActiveEntity for CoordinationEntity {
    async fn invoke(
        &self,
        caller: ClientHandle,
        payload: &[u8],
    ) -> Result<Vec<u8>, CallFailure> {
        self.invoker.invoke(caller, payload).await.map_err(CallFailure::from)
    }

    fn connected(&self, client: ClientHandle) {
        self.invoker.add_client(client);
    }

    /// The subscription drops before the elections do, matching connect
    /// in reverse.
    fn disconnected(&self, client: ClientHandle) {
        self.invoker.remove_client(client);
        self.elector.delist_all(client);
    }
}

/// Platform-facing factory for coordination entities.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoordinationEntityService;

impl CoordinationEntityService {
    pub fn handles_entity_type(&self, entity_type: &str) -> bool {
        entity_type == ENTITY_TYPE
    }

    pub fn version(&self) -> u64 {
        VERSION
    }

    /// Build the active entity for one deployment. Coordination takes no
    /// configuration, so a non-empty blob is refused.
    pub fn create_active_entity(
        &self,
        communicator: Arc<dyn ClientCommunicator>,
        configuration: &[u8],
    ) -> Result<CoordinationEntity, CoordinationBuildError> {
        if !configuration.is_empty() {
            return Err(CoordinationBuildError::UnexpectedConfig {
                len: configuration.len(),
            });
        }
        CoordinationEntity::new(communicator)
    }
}
