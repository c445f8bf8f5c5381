//! Per-invocation caller context.
//!
//! The caller's handle is visible for exactly the extent of one dispatched
//! call, via a task-local scope. Sibling tasks never see it, and the slot
//! clears itself on every exit path, cancellation included.

use std::future::Future;

use socle_entity::ClientHandle;

tokio::task_local! {
    static CURRENT_CALLER: ClientHandle;
}

/// Run `fut` with `caller` as the current invocation's caller.
pub(crate) async fn scope<F>(caller: ClientHandle, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CALLER.scope(caller, fut).await
}

/// The caller of the invocation this task is executing, if any.
///
/// `None` outside a dispatch scope; broadcasts fired from background work
/// exclude nobody.
pub fn current_caller() -> Option<ClientHandle> {
    CURRENT_CALLER.try_with(|caller| *caller).ok()
}
