use async_trait::async_trait;

use crate::client::ClientHandle;
use crate::error::DeliveryError;

/// Server-to-client push channel provided by the hosting platform.
///
/// Entities hand fully framed payloads to the platform; the platform owns
/// addressing, buffering, and the connection itself.
#[async_trait]
pub trait ClientCommunicator: Send + Sync {
    /// Push `bytes` to `client`, resolving once the delivery outcome is
    /// known.
    async fn send(&self, client: ClientHandle, bytes: Vec<u8>) -> Result<(), DeliveryError>;

    /// Push `bytes` to `client` without waiting for a delivery outcome.
    /// Failures are the platform's to log; the caller never observes them.
    fn send_no_response(&self, client: ClientHandle, bytes: Vec<u8>);
}
