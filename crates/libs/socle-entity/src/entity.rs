use async_trait::async_trait;

use crate::client::ClientHandle;
use crate::error::CallFailure;

/// Server-side surface the platform drives.
///
/// The platform delivers each inbound invocation payload together with the
/// handle of the connection it arrived on — caller identity is established
/// here and nowhere else. Lifecycle notifications are synchronous hooks;
/// entities that need to do async work on disconnect spawn it themselves.
#[async_trait]
pub trait ActiveEntity: Send + Sync {
    /// Handle one inbound invocation payload from `caller`.
    async fn invoke(&self, caller: ClientHandle, payload: &[u8]) -> Result<Vec<u8>, CallFailure>;

    /// A client connected to this entity.
    fn connected(&self, client: ClientHandle);

    /// A client disconnected, or its connection was torn down.
    fn disconnected(&self, client: ClientHandle);
}
