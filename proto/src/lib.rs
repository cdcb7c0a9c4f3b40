/*!
Wire types for the conduit real-time RPC client core: the selection
algebra, endpoint identity, operation/result envelopes, and handshake
metadata shapes described in the spec's data model. No transport, no
dispatch logic — those live in `conduit-core`.
*/

pub mod endpoint;
pub mod error;
pub mod id;
pub mod metadata;
pub mod operation;
pub mod selection;

pub use endpoint::{EndpointKey, InputHash, OperationPath};
pub use error::CodecError;
pub use id::{ObserverId, OperationId, TransactionId};
pub use metadata::{FieldMode, Metadata, OperationMeta, OperationsNode, OptimisticDescriptor};
pub use operation::{OperationEnvelope, OperationKind, OperationMetaRequest, ResultEnvelope};
pub use selection::{expanded, filter, intersect, merge, merge_all, selections_equal, Selection};
