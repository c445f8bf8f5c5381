use async_trait::async_trait;

use crate::error::CallFailure;

/// Client-side call primitive: one request payload out, one response
/// payload back.
///
/// Implementations wrap whatever transport reaches the server-side entity
/// (a network connection, or an in-process binding in tests). Stubs layer
/// encoding and method resolution on top of this.
#[async_trait]
pub trait EntityEndpoint: Send + Sync {
    async fn call(&self, payload: Vec<u8>) -> Result<Vec<u8>, CallFailure>;
}
