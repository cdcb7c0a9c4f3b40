//! Reactive dispatch engine for a typed, real-time RPC client: the
//! endpoint registry and observer model, the microtask query batcher, the
//! snapshot/ops stream reducer, the lazy connection manager, the
//! capability-based transport router, the plugin pipeline, the optimistic
//! mutation bracket, and the dynamic proxy front-end that ties them
//! together. Transports, schema tooling, and per-framework reactivity
//! bindings are external collaborators (see the `Transport`, `Plugin`, and
//! `OptimisticInterpreter` traits in this crate).

pub mod batcher;
pub mod capability_router;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod metadata_oracle;
pub mod optimistic;
pub mod plugin;
pub mod proxy;
pub mod reducer;
pub mod registry;
pub mod task;
pub mod transport;

pub use batcher::{BatchRunner, Batcher};
pub use capability_router::CapabilityRouter;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use connection::ConnectionManager;
pub use dispatch::Dispatcher;
pub use error::ClientError;
pub use metadata_oracle::{MetadataOracle, RouteInfo};
pub use optimistic::{EndpointNotifier, OptimisticBracket, OptimisticHandle, OptimisticInterpreter};
pub use plugin::{Plugin, RetryFn};
pub use proxy::{CallDescriptor, ProxyNode, ProxyOutcome, QueryResult};
pub use reducer::{OpApplier, Reducer};
pub use registry::{AddObserverOutcome, Endpoint, ObserverEntry, ObserverId, Registry, RemoveObserverOutcome};
pub use transport::{Capabilities, SubscriptionObserver, SubscriptionStream, Transport};

// Re-exported for convenience so a consumer of this crate rarely needs a
// direct `conduit-proto`/`conduit-signals` dependency for the common path.
pub use conduit_proto::{
    expanded, filter, intersect, merge, merge_all, selections_equal, EndpointKey, FieldMode, InputHash, Metadata, OperationEnvelope, OperationId,
    OperationKind, OperationMeta, OperationMetaRequest, OperationPath, OperationsNode, OptimisticDescriptor, ResultEnvelope, Selection, TransactionId,
};
pub use conduit_signals::{BoxObserver, Broadcast, ListenerGuard, Observer, Unsubscribe};
