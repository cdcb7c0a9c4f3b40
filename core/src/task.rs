use std::future::Future;
use std::time::Duration;

/// Spawn a task on whichever executor this build targets. Native builds use
/// `tokio::spawn`; wasm builds use `wasm-bindgen-futures`, since a browser
/// has no notion of an OS thread to hand a future to.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Send,
{
    tokio::spawn(future);
}

#[cfg(target_arch = "wasm32")]
pub fn spawn<F>(future: F)
where F: Future<Output = ()> + 'static {
    wasm_bindgen_futures::spawn_local(future);
}

/// Yield once to the executor. Used to defer work until "the current
/// synchronous pass of work completes" — the microtask-flush analogue the
/// query batcher needs (§9 Design Notes: abstract microtask scheduling to
/// "defer until current synchronous work completes").
#[cfg(not(target_arch = "wasm32"))]
pub async fn yield_now() { tokio::task::yield_now().await; }

#[cfg(target_arch = "wasm32")]
pub async fn yield_now() {
    struct YieldOnce(bool);
    impl Future for YieldOnce {
        type Output = ();
        fn poll(mut self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<()> {
            if self.0 {
                std::task::Poll::Ready(())
            } else {
                self.0 = true;
                cx.waker().wake_by_ref();
                std::task::Poll::Pending
            }
        }
    }
    YieldOnce(false).await
}

/// Defers a batch flush by `duration` if one is configured (§C14's
/// `max_batch_wait`), otherwise just yields once — the existing microtask
/// behavior. On wasm there is no timer primitive in this crate's dependency
/// stack, so a configured wait degrades to a bare yield there; native builds
/// honor it via `tokio::time::sleep`.
#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep_or_yield(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => yield_now().await,
    }
}

#[cfg(target_arch = "wasm32")]
pub async fn sleep_or_yield(_duration: Option<Duration>) {
    yield_now().await;
}
