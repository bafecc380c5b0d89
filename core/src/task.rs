//! Task lifetime helpers for attach sessions.

use tokio::task::JoinHandle;

/// Cancel a task and wait for it to wind down. Cancellation is expected and
/// swallowed; anything else that comes out of the join is logged, never
/// propagated.
pub async fn cancel_and_await<T>(handle: JoinHandle<T>) {
    handle.abort();
    match handle.await {
        Ok(_) => {}
        Err(err) if err.is_cancelled() => {}
        Err(err) => log::warn!("task failed during teardown: {err}"),
    }
}

/// Supervise a set of sibling tasks: wait for the first to finish on its own,
/// then cancel and await all the others. Returns the first task's value, or
/// `None` if it panicked or was cancelled from outside.
pub async fn supervise<T: Send + 'static>(handles: Vec<JoinHandle<T>>) -> Option<T> {
    if handles.is_empty() {
        return None;
    }
    let (first, _index, rest) = futures::future::select_all(handles).await;
    for handle in rest {
        cancel_and_await(handle).await;
    }
    match first {
        Ok(value) => Some(value),
        Err(err) => {
            if !err.is_cancelled() {
                log::warn!("attach task failed: {err}");
            }
            None
        }
    }
}
