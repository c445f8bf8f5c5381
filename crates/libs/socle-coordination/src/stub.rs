//! Client side of coordination: a typed stub over the generic call and
//! push machinery.

use std::sync::Arc;

use async_trait::async_trait;

use socle_entity::{ClientHandle, EntityEndpoint};
use socle_proxy::{
    from_wire, to_wire, BuildError, Codec, EntityStub, FireError, PushDispatcher, StubError,
    WireValue,
};

use crate::contract::{
    methods, CoordinationError, CoordinationService, LeaderElected, Permit, PermitIssued,
    COORDINATION_CONTRACT, COORDINATION_EVENTS,
};

/// Typed client for the coordination entity. Calls go out through the
/// generic stub; push frames come back in through [`handle_push`].
///
/// [`handle_push`]: CoordinationStub::handle_push
pub struct CoordinationStub<E> {
    calls: EntityStub<E>,
    pushes: PushDispatcher,
}

impl<E: EntityEndpoint> CoordinationStub<E> {
    pub fn new(endpoint: E, codec: Arc<dyn Codec>) -> Result<Self, BuildError> {
        Ok(Self {
            calls: EntityStub::new(&COORDINATION_CONTRACT, endpoint, Arc::clone(&codec))?,
            pushes: PushDispatcher::new(COORDINATION_EVENTS, codec)?,
        })
    }

    /// Watch leadership announcements for every subject.
    pub fn on_leader_elected<F>(&self, listener: F) -> Result<(), FireError>
    where
        F: Fn(LeaderElected) + Send + Sync + 'static,
    {
        self.pushes.register::<LeaderElected, _>(listener)
    }

    /// Watch for permits handed to this client when a leader ahead of it
    /// leaves.
    pub fn on_permit_issued<F>(&self, listener: F) -> Result<(), FireError>
    where
        F: Fn(PermitIssued) + Send + Sync + 'static,
    {
        self.pushes.register::<PermitIssued, _>(listener)
    }

    /// Route one inbound push frame to the registered listeners.
    pub fn handle_push(&self, frame: &[u8]) -> Result<(), CoordinationError> {
        self.pushes.dispatch(frame).map_err(proxy_failure)
    }
}

fn proxy_failure(err: impl std::fmt::Display) -> CoordinationError {
    CoordinationError::Proxy {
        detail: err.to_string(),
    }
}

fn stub_failure(err: StubError) -> CoordinationError {
    match err {
        StubError::Invocation { detail } => CoordinationError::Remote { detail },
        other => proxy_failure(other),
    }
}

#[async_trait]
impl<E: EntityEndpoint> CoordinationService for CoordinationStub<E> {
    /// The `candidate` argument is a placeholder. The slot is struck from
    /// the wire and the server substitutes the true caller, so clients
    /// cannot enlist on another client's behalf.
    async fn enlist(
        &self,
        subject: &str,
        _candidate: ClientHandle,
    ) -> Result<Option<Permit>, CoordinationError> {
        let reply = self
            .calls
            .call(
                methods::ENLIST,
                vec![WireValue::from(subject), WireValue::Nil],
            )
            .await
            .map_err(stub_failure)?;
        from_wire(reply).map_err(proxy_failure)
    }

    async fn accept(&self, subject: &str, permit: Permit) -> Result<(), CoordinationError> {
        let permit = to_wire(&permit).map_err(proxy_failure)?;
        self.calls
            .call_unit(methods::ACCEPT, vec![WireValue::from(subject), permit])
            .await
            .map_err(stub_failure)
    }

    async fn delist(
        &self,
        subject: &str,
        _candidate: ClientHandle,
    ) -> Result<(), CoordinationError> {
        self.calls
            .call_unit(
                methods::DELIST,
                vec![WireValue::from(subject), WireValue::Nil],
            )
            .await
            .map_err(stub_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_refusals_and_proxy_failures_stay_distinct() {
        let remote = stub_failure(StubError::Invocation {
            detail: "stale permit for subject lock".to_string(),
        });
        assert_eq!(
            remote,
            CoordinationError::Remote {
                detail: "stale permit for subject lock".to_string()
            }
        );

        let proxy = stub_failure(StubError::Transport {
            detail: "connection reset".to_string(),
        });
        assert!(matches!(proxy, CoordinationError::Proxy { .. }));
    }
}
