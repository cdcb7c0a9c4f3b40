use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The mode a field on a return entity is exposed in, per the handshake's
/// `entities` map. Determines whether selecting that field forces a
/// streaming transport (`Subscribe`/`Live`) or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMode {
    Exposed,
    Resolve,
    Subscribe,
    Live,
}

impl FieldMode {
    pub fn requires_stream(&self) -> bool { matches!(self, FieldMode::Subscribe | FieldMode::Live) }
}

/// A description of a loosely-typed optimistic-update hook declared on a
/// mutation. The interpretation of `descriptor` is entirely owned by
/// whatever `OptimisticInterpreter` the caller plugs in; the core only knows
/// that one is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimisticDescriptor {
    pub descriptor: serde_json::Value,
}

/// Leaf of the `operations` namespace tree returned by the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMeta {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub return_entity_name: Option<String>,
    #[serde(default)]
    pub live: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub optimistic: Option<OptimisticDescriptor>,
}

/// A node of the `operations` namespace tree: either a leaf describing one
/// callable operation, or a further nesting level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationsNode {
    Leaf(OperationMeta),
    Map(BTreeMap<String, OperationsNode>),
}

impl OperationsNode {
    /// Walk the namespace tree along `segments`, returning the leaf if the
    /// full path resolves to one.
    pub fn resolve<'a>(&'a self, mut segments: impl Iterator<Item = &'a str>) -> Option<&'a OperationMeta> {
        match segments.next() {
            None => match self {
                OperationsNode::Leaf(meta) => Some(meta),
                OperationsNode::Map(_) => None,
            },
            Some(segment) => match self {
                OperationsNode::Leaf(_) => None,
                OperationsNode::Map(children) => children.get(segment)?.resolve(segments),
            },
        }
    }
}

/// The handshake result: `{ version, operations, entities }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub version: String,
    pub operations: OperationsNode,
    #[serde(default)]
    pub entities: BTreeMap<String, BTreeMap<String, FieldMode>>,
}

impl Metadata {
    /// An empty namespace tree — a connected-but-nothing-declared handshake
    /// result, useful as a fake-transport baseline in tests.
    pub fn empty() -> Self { Metadata { version: "0".to_string(), operations: OperationsNode::Map(BTreeMap::new()), entities: BTreeMap::new() } }

    pub fn resolve_operation(&self, path: &str) -> Option<&OperationMeta> { self.operations.resolve(path.split('.')) }

    pub fn entity_fields(&self, entity_name: &str) -> Option<&BTreeMap<String, FieldMode>> { self.entities.get(entity_name) }
}
