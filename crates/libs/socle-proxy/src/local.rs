//! In-process platform adapters.
//!
//! Embedders and tests run entities without a hosting platform:
//! [`LocalCommunicator`] gives each client an in-memory mailbox for
//! pushes, and [`LocalEndpoint`] binds a client handle straight to an
//! entity for calls. Together they close the loop a real platform would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use socle_entity::{
    ActiveEntity, CallFailure, ClientCommunicator, ClientHandle, DeliveryError, EntityEndpoint,
};

/// In-memory push channel: one unbounded mailbox per attached client.
#[derive(Default)]
pub struct LocalCommunicator {
    mailboxes: Mutex<HashMap<ClientHandle, mpsc::UnboundedSender<Vec<u8>>>>,
}

impl LocalCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `client`, returning the receiving half of its mailbox.
    /// Attaching again replaces the mailbox.
    pub fn attach(&self, client: ClientHandle) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes
            .lock()
            .expect("mailboxes mutex poisoned")
            .insert(client, tx);
        rx
    }

    /// Detach `client`; later sends to it fail as unreachable.
    pub fn detach(&self, client: ClientHandle) {
        self.mailboxes
            .lock()
            .expect("mailboxes mutex poisoned")
            .remove(&client);
    }

    fn push(&self, client: ClientHandle, bytes: Vec<u8>) -> Result<(), DeliveryError> {
        let guard = self.mailboxes.lock().expect("mailboxes mutex poisoned");
        let Some(tx) = guard.get(&client) else {
            return Err(DeliveryError::Unreachable { client });
        };
        tx.send(bytes)
            .map_err(|_| DeliveryError::ChannelClosed { client })
    }
}

#[async_trait]
impl ClientCommunicator for LocalCommunicator {
    async fn send(&self, client: ClientHandle, bytes: Vec<u8>) -> Result<(), DeliveryError> {
        self.push(client, bytes)
    }

    fn send_no_response(&self, client: ClientHandle, bytes: Vec<u8>) {
        if let Err(err) = self.push(client, bytes) {
            log::debug!("local: dropping push: {err}");
        }
    }
}

/// Binds one client handle to an entity, registering the connection on
/// construction.
pub struct LocalEndpoint {
    entity: Arc<dyn ActiveEntity>,
    client: ClientHandle,
}

impl LocalEndpoint {
    pub fn connect(entity: Arc<dyn ActiveEntity>, client: ClientHandle) -> Self {
        entity.connected(client);
        Self { entity, client }
    }

    pub fn client(&self) -> ClientHandle {
        self.client
    }

    /// Tear the connection down, notifying the entity.
    pub fn disconnect(self) {
        self.entity.disconnected(self.client);
    }
}

#[async_trait]
impl EntityEndpoint for LocalEndpoint {
    async fn call(&self, payload: Vec<u8>) -> Result<Vec<u8>, CallFailure> {
        self.entity.invoke(self.client, &payload).await
    }
}
