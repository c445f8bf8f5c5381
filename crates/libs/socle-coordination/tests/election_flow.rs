//! Full-stack election flows: typed stubs talking to the wired entity
//! over in-process connections.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use socle_coordination::{
    CoordinationEntity, CoordinationError, CoordinationService, CoordinationStub, LeaderElected,
    Permit, PermitIssued,
};
use socle_entity::{ActiveEntity, ClientCommunicator, ClientHandle};
use socle_proxy::{LocalCommunicator, LocalEndpoint, MsgpackCodec};

/// Whatever a client passes for a caller slot is struck from the wire,
/// so tests pass an obviously meaningless handle.
const PLACEHOLDER: ClientHandle = ClientHandle::new(0);

struct TestClient {
    handle: ClientHandle,
    stub: CoordinationStub<LocalEndpoint>,
    inbox: mpsc::UnboundedReceiver<Vec<u8>>,
    announcements: Arc<Mutex<Vec<LeaderElected>>>,
    grants: Arc<Mutex<Vec<PermitIssued>>>,
}

impl TestClient {
    /// Route every queued push frame through the stub's listeners.
    fn drain_pushes(&mut self) {
        while let Ok(frame) = self.inbox.try_recv() {
            self.stub.handle_push(&frame).expect("handle push");
        }
    }

    fn elected_subjects(&self) -> Vec<String> {
        self.announcements
            .lock()
            .expect("announcements mutex poisoned")
            .iter()
            .map(|event| event.subject.clone())
            .collect()
    }

    fn granted(&self) -> Vec<PermitIssued> {
        self.grants.lock().expect("grants mutex poisoned").clone()
    }
}

fn stack() -> (Arc<LocalCommunicator>, Arc<CoordinationEntity>) {
    let communicator = Arc::new(LocalCommunicator::new());
    let entity = Arc::new(
        CoordinationEntity::new(Arc::clone(&communicator) as Arc<dyn ClientCommunicator>)
            .expect("entity builds"),
    );
    (communicator, entity)
}

fn connect(
    entity: &Arc<CoordinationEntity>,
    communicator: &Arc<LocalCommunicator>,
    id: u64,
) -> TestClient {
    let handle = ClientHandle::new(id);
    let inbox = communicator.attach(handle);
    let endpoint = LocalEndpoint::connect(Arc::clone(entity) as Arc<dyn ActiveEntity>, handle);
    let stub = CoordinationStub::new(endpoint, Arc::new(MsgpackCodec)).expect("stub builds");

    let announcements = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&announcements);
    stub.on_leader_elected(move |event| {
        log.lock().expect("announcements mutex poisoned").push(event);
    })
    .expect("register election listener");

    let grants = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&grants);
    stub.on_permit_issued(move |event| {
        log.lock().expect("grants mutex poisoned").push(event);
    })
    .expect("register permit listener");

    TestClient {
        handle,
        stub,
        inbox,
        announcements,
        grants,
    }
}

#[tokio::test]
async fn the_first_candidate_wins_and_acceptance_is_announced() {
    let (communicator, entity) = stack();
    let mut a = connect(&entity, &communicator, 1);
    let mut b = connect(&entity, &communicator, 2);

    let permit = a
        .stub
        .enlist("lock", PLACEHOLDER)
        .await
        .expect("enlist")
        .expect("front of the queue");
    assert_eq!(b.stub.enlist("lock", PLACEHOLDER).await.expect("enlist"), None);

    a.stub.accept("lock", permit).await.expect("accept");

    a.drain_pushes();
    b.drain_pushes();
    assert!(a.elected_subjects().is_empty());
    assert_eq!(b.elected_subjects(), vec!["lock".to_string()]);
}

#[tokio::test]
async fn a_stale_permit_is_refused() {
    let (communicator, entity) = stack();
    let a = connect(&entity, &communicator, 1);
    let b = connect(&entity, &communicator, 2);

    let permit = a
        .stub
        .enlist("lock", PLACEHOLDER)
        .await
        .expect("enlist")
        .expect("front of the queue");
    assert_eq!(b.stub.enlist("lock", PLACEHOLDER).await.expect("enlist"), None);

    let forged = Permit::new(permit.raw() + 40);
    let refused = b.stub.accept("lock", forged).await.expect_err("stale permit");
    match refused {
        CoordinationError::Remote { detail } => assert!(detail.contains("stale permit")),
        other => panic!("unexpected failure class: {other}"),
    }

    let missing = a
        .stub
        .accept("ghost", permit)
        .await
        .expect_err("no such election");
    match missing {
        CoordinationError::Remote { detail } => assert!(detail.contains("no election")),
        other => panic!("unexpected failure class: {other}"),
    }
}

#[tokio::test]
async fn delisting_the_leader_hands_the_permit_to_the_successor() {
    let (communicator, entity) = stack();
    let mut a = connect(&entity, &communicator, 1);
    let mut b = connect(&entity, &communicator, 2);

    let permit = a
        .stub
        .enlist("lock", PLACEHOLDER)
        .await
        .expect("enlist")
        .expect("front of the queue");
    a.stub.accept("lock", permit).await.expect("accept");
    assert_eq!(b.stub.enlist("lock", PLACEHOLDER).await.expect("enlist"), None);

    a.stub.delist("lock", PLACEHOLDER).await.expect("delist");

    b.drain_pushes();
    assert_eq!(b.elected_subjects(), vec!["lock".to_string()]);
    let grants = b.granted();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].subject, "lock");

    b.stub
        .accept("lock", grants[0].permit)
        .await
        .expect("promoted permit is live");

    a.drain_pushes();
    assert_eq!(a.elected_subjects(), vec!["lock".to_string()]);
    assert!(a.granted().is_empty());
}

#[tokio::test]
async fn a_disconnect_delists_the_client_everywhere() {
    let (communicator, entity) = stack();
    let mut a = connect(&entity, &communicator, 1);
    let mut b = connect(&entity, &communicator, 2);

    a.stub
        .enlist("lock-a", PLACEHOLDER)
        .await
        .expect("enlist")
        .expect("front of the queue");
    a.stub
        .enlist("lock-b", PLACEHOLDER)
        .await
        .expect("enlist")
        .expect("front of the queue");
    assert_eq!(b.stub.enlist("lock-a", PLACEHOLDER).await.expect("enlist"), None);
    assert_eq!(b.stub.enlist("lock-b", PLACEHOLDER).await.expect("enlist"), None);

    entity.disconnected(a.handle);

    b.drain_pushes();
    let mut subjects: Vec<String> = b
        .granted()
        .into_iter()
        .map(|grant| grant.subject)
        .collect();
    subjects.sort();
    assert_eq!(subjects, vec!["lock-a".to_string(), "lock-b".to_string()]);
    assert_eq!(entity.elector().leader_of("lock-a"), Some(b.handle));

    let grant = b
        .granted()
        .into_iter()
        .find(|grant| grant.subject == "lock-a")
        .expect("grant for lock-a");
    b.stub
        .accept("lock-a", grant.permit)
        .await
        .expect("promoted permit is live");

    a.drain_pushes();
    assert!(a.granted().is_empty());
    assert!(a.elected_subjects().is_empty());
}

#[tokio::test]
async fn the_server_trusts_the_connection_not_the_argument() {
    let (communicator, entity) = stack();
    let a = connect(&entity, &communicator, 7);

    let forged = ClientHandle::new(999);
    a.stub
        .enlist("lock", forged)
        .await
        .expect("enlist")
        .expect("front of the queue");

    assert_eq!(entity.elector().leader_of("lock"), Some(a.handle));
}

#[tokio::test]
async fn an_unknown_push_frame_surfaces_as_a_proxy_failure() {
    let (communicator, entity) = stack();
    let a = connect(&entity, &communicator, 1);

    let err = a.stub.handle_push(&[9]).expect_err("unknown event id");
    assert!(matches!(err, CoordinationError::Proxy { .. }));
}
