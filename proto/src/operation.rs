use crate::{id::OperationId, selection::Selection, OperationPath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The three operation kinds a server namespace leaf can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        })
    }
}

/// Per-call metadata riding alongside an [`OperationEnvelope`] to the
/// transport — everything a transport might need beyond path/input/kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationMetaRequest {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub select: Option<Selection>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub headers: BTreeMap<String, String>,
}

/// What gets handed to a transport's `query`/`mutation`/`subscription`
/// method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEnvelope {
    pub id: OperationId,
    pub path: OperationPath,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub meta: OperationMetaRequest,
}

impl OperationEnvelope {
    pub fn new(path: OperationPath, kind: OperationKind, input: Option<serde_json::Value>) -> Self {
        Self { id: OperationId::new(), path, kind, input, meta: OperationMetaRequest::default() }
    }

    pub fn with_select(mut self, select: Selection) -> Self {
        self.meta.select = Some(select);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.meta.timeout_ms = Some(timeout_ms);
        self
    }
}

/// What a transport hands back — a discriminated variant, never a loosely
/// typed `Result`, so the reducer can exhaustively match it (§9 Design
/// Notes: replace dynamic `type` dispatch with a closed variant).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "$", rename_all = "snake_case")]
pub enum ResultEnvelope {
    Snapshot { data: serde_json::Value },
    Ops { ops: Vec<serde_json::Value> },
    Error { error: String },
}
