//! Platform helpers for background tasks and timers.

use std::future::Future;
use std::time::Duration;

/// Boxed unit future handed to schedulers; `Send` on native targets only.
#[cfg(not(target_arch = "wasm32"))]
pub type TaskFuture = futures::future::BoxFuture<'static, ()>;
#[cfg(target_arch = "wasm32")]
pub type TaskFuture = futures::future::LocalBoxFuture<'static, ()>;

/// Boxes `future` into a [`TaskFuture`].
#[cfg(not(target_arch = "wasm32"))]
pub fn boxed_task<F>(future: F) -> TaskFuture
where
    F: Future<Output = ()> + Send + 'static,
{
    Box::pin(future)
}

#[cfg(target_arch = "wasm32")]
pub fn boxed_task<F>(future: F) -> TaskFuture
where
    F: Future<Output = ()> + 'static,
{
    Box::pin(future)
}

/// Spawns `future` in the background without waiting for it.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Spawns `future` in the background without waiting for it.
///
/// Uses the ambient Tokio runtime when there is one. Otherwise the task goes to
/// a single worker thread owned by this module, so debounce timers fire even
/// when the caller never enters a runtime.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static SYNC_WORKER: LazyLock<Option<Runtime>> = LazyLock::new(|| {
        match Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("questlog-sync")
            .enable_time()
            .build()
        {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                log::warn!("failed to start background sync worker: {err}");
                None
            }
        }
    });

    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => match SYNC_WORKER.as_ref() {
            Some(runtime) => {
                runtime.spawn(future);
            }
            None => log::warn!("dropping background task: no runtime available"),
        },
    }
}

/// Waits for `duration` without blocking the thread.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    gloo_timers::future::sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    tokio::time::sleep(duration).await;
}
