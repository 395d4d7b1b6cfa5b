use std::future::Future;
use std::time::Duration;

/// Platform-independent helper to spawn an async task that runs in the background.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Platform-independent helper to spawn an async task that runs in the background.
///
/// Inside a tokio runtime the task joins that runtime; otherwise it runs on a shared background
/// runtime owned by the crate, so tracking calls made from synchronous hosts still get delivered.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
        Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("observability-background")
            .enable_all()
            .build()
            .map_err(|err| log::warn!("failed to build background tokio runtime: {err}"))
            .ok()
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else if let Some(runtime) = BACKGROUND_RUNTIME.as_ref() {
        let _ = runtime.spawn(future);
    }
}

/// Asynchronously waits for the provided duration in a platform-compatible way.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    use gloo_timers::future::sleep;
    sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    use tokio::time::sleep;
    sleep(duration).await;
}

/// Error returned by [`with_timeout`] when the deadline elapses first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutError;

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("operation timed out")
    }
}

impl std::error::Error for TimeoutError {}

/// Races `future` against a timer.
#[cfg(not(target_arch = "wasm32"))]
pub async fn with_timeout<F>(future: F, timeout: Duration) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| TimeoutError)
}

/// Races `future` against a timer.
#[cfg(target_arch = "wasm32")]
pub async fn with_timeout<F>(future: F, timeout: Duration) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    use futures::future::{select, Either};

    let future = std::pin::pin!(future);
    let timer = std::pin::pin!(sleep_impl(timeout));
    match select(future, timer).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(_) => Err(TimeoutError),
    }
}
