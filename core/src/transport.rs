use crate::error::ClientError;
use async_trait::async_trait;
use conduit_proto::{Metadata, OperationEnvelope, ResultEnvelope};
use conduit_signals::{BoxObserver, Unsubscribe};

/// Which operation kinds a transport can serve, declared up front so the
/// capability router (§6/§11) can pick a route without downcasting. A
/// transport that can't be asked "do you implement `query`" at runtime
/// (Rust has no reflection over trait-method overrides) instead declares
/// this once; `Transport::query`/`mutation`/`subscription` default to a
/// configuration error so a transport only needs to override what it
/// actually claims here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub query: bool,
    pub mutation: bool,
    pub subscription: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities { query: false, mutation: false, subscription: false };

    pub fn all() -> Self { Capabilities { query: true, mutation: true, subscription: true } }

    pub fn is_empty(&self) -> bool { !self.query && !self.mutation && !self.subscription }
}

/// Observer handed to a live subscription. Delivered values are the raw
/// [`ResultEnvelope`] the transport emits; the stream reducer (C5) is what
/// turns those into baseline updates.
pub type SubscriptionObserver = BoxObserver<ResultEnvelope, ClientError>;

/// A live server subscription. `subscribe` registers one local fan-out
/// point (the reducer attaches here); dropping the returned [`Unsubscribe`]
/// without calling it leaves the subscription running, matching the JS
/// original's plain teardown closure rather than a drop-based guard.
pub trait SubscriptionStream: Send + Sync {
    fn subscribe(&self, observer: SubscriptionObserver) -> Unsubscribe;
}

/// The core's contract with whatever ships bytes. At least one of
/// `query`/`mutation`/`subscription` must be meaningfully implemented;
/// which ones are is declared via [`Capabilities::capabilities`] rather
/// than discovered by trying and catching a "not implemented" error, so the
/// capability router can make routing decisions without ever calling a
/// transport method it knows will fail.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One-shot handshake. May fail; the connection manager (C7) retries
    /// exactly once per failure on the next operation.
    async fn connect(&self) -> Result<Metadata, ClientError>;

    fn capabilities(&self) -> Capabilities;

    async fn query(&self, _op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        Err(ClientError::configuration("transport does not implement query"))
    }

    async fn mutation(&self, _op: OperationEnvelope) -> Result<ResultEnvelope, ClientError> {
        Err(ClientError::configuration("transport does not implement mutation"))
    }

    async fn subscription(&self, _op: OperationEnvelope) -> Result<Box<dyn SubscriptionStream>, ClientError> {
        Err(ClientError::configuration("transport does not implement subscription"))
    }
}
