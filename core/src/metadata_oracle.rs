use conduit_proto::{FieldMode, Metadata, OperationKind, Selection};

/// What dispatch needs to know about a path before it can route: which kind
/// of operation it is, and whether serving it needs a streaming transport
/// (§4.7/C8). Absent metadata defaults to `Query` — a path the handshake
/// didn't describe is assumed to be a plain one-shot call rather than
/// treated as an error at this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteInfo {
    pub kind: OperationKind,
    pub requires_stream: bool,
}

/// Depth bound on the return-entity traversal below, so a self-referential
/// entity graph (a `Post` that resolves an `author` whose `posts` resolve
/// back) can't recurse forever.
const MAX_ENTITY_DEPTH: usize = 8;

/// Resolves a call path (plus the caller's selection, if any) to a
/// [`RouteInfo`] by consulting the cached handshake [`Metadata`].
pub struct MetadataOracle<'a> {
    metadata: &'a Metadata,
}

impl<'a> MetadataOracle<'a> {
    pub fn new(metadata: &'a Metadata) -> Self { Self { metadata } }

    pub fn route(&self, path: &str, selection: Option<&Selection>) -> RouteInfo {
        let Some(op) = self.metadata.resolve_operation(path) else {
            return RouteInfo { kind: OperationKind::Query, requires_stream: false };
        };

        if op.kind == OperationKind::Subscription {
            return RouteInfo { kind: op.kind, requires_stream: true };
        }
        if op.live {
            return RouteInfo { kind: op.kind, requires_stream: true };
        }

        let requires_stream = match (&op.return_entity_name, selection) {
            (Some(entity), Some(selection)) => self.selection_requires_stream(entity, selection, 0),
            _ => false,
        };
        RouteInfo { kind: op.kind, requires_stream }
    }

    /// True if any field reachable through `selection` on `entity` is marked
    /// `subscribe`/`live` in the entities map. Traversal follows `select`
    /// nodes whose field name matches an entity field name; depth-bounded
    /// since the entities map has no acyclicity guarantee.
    fn selection_requires_stream(&self, entity: &str, selection: &Selection, depth: usize) -> bool {
        if depth >= MAX_ENTITY_DEPTH {
            return false;
        }
        let Some(fields) = self.metadata.entity_fields(entity) else { return false };

        match selection {
            Selection::Include => fields.values().any(FieldMode::requires_stream),
            Selection::Node { select, .. } => select.iter().any(|(field, child)| match fields.get(field) {
                Some(mode) if mode.requires_stream() => true,
                _ => self.selection_requires_stream(field, child, depth + 1),
            }),
        }
    }
}
