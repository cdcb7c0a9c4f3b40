use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique id stamped on every outgoing operation envelope. Carried through
/// the transport round trip so a result can be correlated back to its
/// request; has no meaning beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(Ulid);

impl OperationId {
    pub fn new() -> Self { Self(Ulid::new()) }

    /// Deterministic id for tests.
    pub fn test(id: u64) -> Self { Self(Ulid::from_parts(id, 0)) }
}

impl Default for OperationId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "op_{}", self.0) }
}

/// Unique id assigned to each registered observer of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObserverId(Ulid);

impl ObserverId {
    pub fn new() -> Self { Self(Ulid::new()) }
    pub fn test(id: u64) -> Self { Self(Ulid::from_parts(id, 0)) }
}

impl Default for ObserverId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "obs_{}", self.0) }
}

/// Id for an optimistic transaction bracketing an in-flight mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Ulid);

impl TransactionId {
    pub fn new() -> Self { Self(Ulid::new()) }
}

impl Default for TransactionId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "tx_{}", self.0) }
}
