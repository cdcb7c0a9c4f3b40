//! Public facade over the [`conduit-core`] dispatch engine: a `Client`
//! construction surface and the re-exported wire/dispatch types a consumer
//! needs without reaching into the lower crates directly.
//!
//! This crate does not generate a statically typed call surface from a
//! server schema — that belongs to a separate code-generation layer the
//! dispatch engine treats as external (see `conduit_core::proxy`'s module
//! doc). What it provides is the dynamic [`ProxyNode`] mirror plus the
//! `Client` that owns one.

pub use conduit_core as core;
pub use conduit_proto as proto;
pub use conduit_signals as signals;

pub use conduit_core::{
    CallDescriptor, ClientConfig, ClientConfigBuilder, ClientError, Dispatcher, EndpointNotifier, OpApplier, OptimisticHandle, OptimisticInterpreter,
    Plugin, ProxyNode, ProxyOutcome, QueryResult, Transport,
};
pub use conduit_proto::{EndpointKey, Metadata, OperationPath, Selection};
pub use conduit_signals::{Observer, Unsubscribe};

use std::sync::Arc;

/// Top-level handle a consumer constructs once per connection. Bundles a
/// [`Dispatcher`] with the root of the dynamic proxy mirror.
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    root: ProxyNode,
}

impl Client {
    /// Constructs a client. With `config.eager_connect` (the default), the
    /// transport handshake launches in the background immediately, without
    /// synchronously blocking construction (§4.6/C7); with it disabled, the
    /// handshake is deferred until the first operation needs it.
    /// `optimistic` may be omitted if no mutation on this server declares an
    /// optimistic descriptor; attempting one without an interpreter
    /// configured surfaces as a configuration error at that mutation.
    pub fn new(
        transport: Arc<dyn Transport>,
        plugins: Vec<Arc<dyn Plugin>>,
        applier: Arc<dyn OpApplier>,
        optimistic: Option<Arc<dyn OptimisticInterpreter>>,
        config: ClientConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(transport, plugins, applier, optimistic, config);
        let root = ProxyNode::new(Arc::clone(&dispatcher));
        Self { dispatcher, root }
    }

    /// Navigates to a dotted path, equivalent to chained `client.a.b.c` on
    /// the original's namespace mirror.
    pub fn at(&self, path: impl AsRef<str>) -> ProxyNode {
        path.as_ref().split('.').filter(|s| !s.is_empty()).fold(self.root.clone(), |node, segment| node.field(segment))
    }

    /// Awaits the (possibly already-cached) handshake result directly,
    /// without going through a proxy call.
    pub async fn metadata(&self) -> Result<Metadata, ClientError> { self.dispatcher.metadata().await }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> { &self.dispatcher }
}
