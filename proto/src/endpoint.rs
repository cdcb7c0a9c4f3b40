use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Dot-joined path identifying a node in the server's namespace tree, e.g.
/// `user.posts.list`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationPath(String);

impl OperationPath {
    pub fn new(path: impl Into<String>) -> Self { Self(path.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn segments(&self) -> impl Iterator<Item = &str> { self.0.split('.') }

    pub fn join(&self, segment: &str) -> Self { Self(format!("{}.{}", self.0, segment)) }
}

impl fmt::Display for OperationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<&str> for OperationPath {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl From<String> for OperationPath {
    fn from(s: String) -> Self { Self(s) }
}

/// Canonical hash of an operation's input, used as half of an [`EndpointKey`].
///
/// Primitive inputs (string, number, bool, null) hash to a direct string
/// form — there's no point canonicalizing a scalar. Object and array inputs
/// are serialized with sorted keys (`serde_json::Value`'s `Object` is a
/// `BTreeMap` under the default feature set, so `to_string` is already key-
/// order-stable) and digested with SHA-256, so two structurally equal
/// objects always produce the same hash regardless of field insertion order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputHash(String);

impl InputHash {
    pub fn of(input: &serde_json::Value) -> Self {
        match input {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                let mut hasher = Sha256::new();
                hasher.update(input.to_string().as_bytes());
                Self(format!("h:{:x}", hasher.finalize()))
            }
            serde_json::Value::Null => Self("p:null".to_string()),
            serde_json::Value::Bool(b) => Self(format!("p:{b}")),
            serde_json::Value::Number(n) => Self(format!("p:{n}")),
            serde_json::Value::String(s) => Self(format!("p:{s}")),
        }
    }

    pub fn none() -> Self { Self("p:()".to_string()) }
}

impl fmt::Display for InputHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// `(operation_path, canonical_input_hash)` — uniquely identifies one server
/// conversation. Two calls with structurally equal inputs share an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub path: OperationPath,
    pub input_hash: InputHash,
}

impl EndpointKey {
    pub fn new(path: OperationPath, input: Option<&serde_json::Value>) -> Self {
        let input_hash = match input {
            Some(v) => InputHash::of(v),
            None => InputHash::none(),
        };
        Self { path, input_hash }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}#{}", self.path, self.input_hash) }
}
