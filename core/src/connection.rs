use crate::error::ClientError;
use crate::task;
use crate::transport::Transport;
use conduit_proto::Metadata;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex};
use tracing::warn;

type HandshakeFuture = Shared<BoxFuture<'static, Result<Metadata, ClientError>>>;

struct State {
    /// Bumped every time a fresh handshake attempt replaces a failed one, so
    /// a caller that raced a concurrent reset doesn't clobber it again.
    generation: u64,
    attempt: HandshakeFuture,
}

/// Lazy or eager, cached handshake (§4.6/C7, §C14's `eager_connect`). With
/// eager connect (the default) the handshake is launched in the background
/// at construction without being awaited — construction stays synchronous —
/// and the first real operation is what actually awaits it. With eager
/// connect disabled, the handshake isn't even launched until the first
/// `ensure_connected` call. Either way, a failed attempt is discarded so the
/// *next* caller gets a fresh one; the call that observed the failure does
/// not retry itself.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    state: Mutex<Option<State>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, eager_connect: bool) -> Arc<Self> {
        let state = if eager_connect {
            Some(State { generation: 0, attempt: Self::spawn_handshake(Arc::clone(&transport)) })
        } else {
            None
        };
        Arc::new(Self { transport, state: Mutex::new(state) })
    }

    fn spawn_handshake(transport: Arc<dyn Transport>) -> HandshakeFuture {
        let fut: BoxFuture<'static, Result<Metadata, ClientError>> = Box::pin(async move { transport.connect().await });
        let shared = fut.shared();
        let driver = shared.clone();
        task::spawn(async move {
            let _ = driver.await;
        });
        shared
    }

    /// Await the handshake, retrying exactly once per observed failure (the
    /// retry happens on the *next* call, not this one — matches the spec's
    /// "next operation retries" wording literally). Lazily launches the very
    /// first attempt if `eager_connect` was disabled.
    pub async fn ensure_connected(&self) -> Result<Metadata, ClientError> {
        let (generation, attempt) = {
            let mut guard = self.state.lock().expect("connection manager lock poisoned");
            let state = guard.get_or_insert_with(|| State { generation: 0, attempt: Self::spawn_handshake(Arc::clone(&self.transport)) });
            (state.generation, state.attempt.clone())
        };

        match attempt.await {
            Ok(metadata) => Ok(metadata),
            Err(err) => {
                let mut guard = self.state.lock().expect("connection manager lock poisoned");
                if let Some(state) = guard.as_mut() {
                    if state.generation == generation {
                        warn!(error = %err, "handshake failed, will retry on next operation");
                        state.generation += 1;
                        state.attempt = Self::spawn_handshake(Arc::clone(&self.transport));
                    }
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Capabilities;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        attempts: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn connect(&self) -> Result<Metadata, ClientError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ClientError::transport("connection refused"))
            } else {
                Ok(Metadata::empty())
            }
        }

        fn capabilities(&self) -> Capabilities { Capabilities::all() }
    }

    #[tokio::test]
    async fn retries_exactly_once_per_failure() {
        let transport = Arc::new(FlakyTransport { attempts: AtomicU32::new(0), fail_first: 1 });
        let manager = ConnectionManager::new(transport.clone() as Arc<dyn Transport>, true);

        assert!(manager.ensure_connected().await.is_err());
        assert!(manager.ensure_connected().await.is_ok());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_is_cached_for_client_lifetime() {
        let transport = Arc::new(FlakyTransport { attempts: AtomicU32::new(0), fail_first: 0 });
        let manager = ConnectionManager::new(transport.clone() as Arc<dyn Transport>, true);

        assert!(manager.ensure_connected().await.is_ok());
        assert!(manager.ensure_connected().await.is_ok());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }

    /// With eager connect disabled, the handshake must not even be attempted
    /// until something actually calls `ensure_connected`.
    #[tokio::test]
    async fn lazy_connect_defers_the_first_attempt() {
        let transport = Arc::new(FlakyTransport { attempts: AtomicU32::new(0), fail_first: 0 });
        let manager = ConnectionManager::new(transport.clone() as Arc<dyn Transport>, false);

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 0, "construction must not launch the handshake when eager_connect is false");
        assert!(manager.ensure_connected().await.is_ok());
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    }
}
