use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A field-selection tree.
///
/// `Include` at a node means "send this entire subtree verbatim"; a `Node`
/// narrows a relation down to a nested selection (and optionally carries the
/// arguments used to resolve that relation). The root selection of an
/// endpoint observer uses the same two shapes — `Include` there means "this
/// observer wants everything", matching `merged_selection = null` in the
/// spec prose (there is no separate `Option` wrapper; `Include` already
/// carries that meaning at any depth).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$", rename_all = "snake_case")]
pub enum Selection {
    Include,
    Node {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        input: Option<serde_json::Value>,
        select: BTreeMap<String, Selection>,
    },
}

impl Selection {
    pub fn everything() -> Self { Selection::Include }

    pub fn node(select: BTreeMap<String, Selection>) -> Self { Selection::Node { input: None, select } }

    pub fn is_include(&self) -> bool { matches!(self, Selection::Include) }

    /// The set of dotted leaf paths this selection reaches. Root-level
    /// `Include` flattens to the single empty-string path. Used only for
    /// expansion diffs — selection equality and merging are defined
    /// structurally, not via this set.
    pub fn flatten(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        flatten_into(self, "", &mut out);
        out
    }
}

fn flatten_into(sel: &Selection, prefix: &str, out: &mut BTreeSet<String>) {
    match sel {
        Selection::Include => {
            out.insert(prefix.to_string());
        }
        Selection::Node { select, .. } => {
            if select.is_empty() {
                out.insert(prefix.to_string());
                return;
            }
            for (field, child) in select {
                let path = if prefix.is_empty() { field.clone() } else { format!("{prefix}.{field}") };
                flatten_into(child, &path, out);
            }
        }
    }
}

/// Two selections are equal iff they flatten to the same set of leaf paths;
/// field ordering within a selection is irrelevant.
pub fn selections_equal(a: &Selection, b: &Selection) -> bool { a.flatten() == b.flatten() }

/// `merge(a, b)`: pointwise union, coarser wins. `Include` absorbs anything.
/// When both sides specify `input` for the same relation and those inputs
/// differ, the first selection's input is kept deterministically and a
/// warning is logged — per the spec, this is a design error for callers to
/// avoid (scope inputs per observer endpoint, or split into separate
/// endpoints per argument set) rather than something the core can resolve
/// meaningfully.
pub fn merge(a: &Selection, b: &Selection) -> Selection {
    match (a, b) {
        (Selection::Include, _) | (_, Selection::Include) => Selection::Include,
        (Selection::Node { input: ia, select: sa }, Selection::Node { input: ib, select: sb }) => {
            let mut select = BTreeMap::new();
            let keys: BTreeSet<&String> = sa.keys().chain(sb.keys()).collect();
            for key in keys {
                let merged = match (sa.get(key), sb.get(key)) {
                    (Some(x), Some(y)) => merge(x, y),
                    (Some(x), None) => x.clone(),
                    (None, Some(y)) => y.clone(),
                    (None, None) => unreachable!("key drawn from union of both maps"),
                };
                select.insert(key.clone(), merged);
            }
            let input = match (ia, ib) {
                (Some(x), Some(y)) if x != y => {
                    tracing::warn!("selection merge: conflicting relation inputs ({x} vs {y}); keeping the first");
                    Some(x.clone())
                }
                (Some(x), _) => Some(x.clone()),
                (None, Some(y)) => Some(y.clone()),
                (None, None) => None,
            };
            Selection::Node { input, select }
        }
    }
}

pub fn merge_all<'a>(selections: impl IntoIterator<Item = &'a Selection>) -> Option<Selection> {
    selections.into_iter().fold(None, |acc, s| match acc {
        None => Some(s.clone()),
        Some(acc) => Some(merge(&acc, s)),
    })
}

/// `a ⊓ b`: selection intersection, equal on shared paths. Used only by the
/// filter round-trip law (`filter(filter(d, S1), S2) == filter(d, S1 ⊓ S2)`);
/// not exercised by the dispatch engine itself.
pub fn intersect(a: &Selection, b: &Selection) -> Selection {
    match (a, b) {
        (Selection::Include, other) | (other, Selection::Include) => other.clone(),
        (Selection::Node { input: ia, select: sa }, Selection::Node { input: ib, select: sb }) => {
            let mut select = BTreeMap::new();
            for (key, x) in sa {
                if let Some(y) = sb.get(key) {
                    select.insert(key.clone(), intersect(x, y));
                }
            }
            let input = ia.clone().or_else(|| ib.clone());
            Selection::Node { input, select }
        }
    }
}

/// True iff `next` contains a leaf path not present in `prev`; drives
/// re-subscription when an observer set's combined selection grows.
pub fn expanded(prev: &Selection, next: &Selection) -> bool {
    let prev_paths = prev.flatten();
    next.flatten().iter().any(|p| !prev_paths.contains(p))
}

/// Project `data` down to the paths named by `selection`. Objects keep only
/// selected keys (plus `id`, always preserved for downstream cache identity);
/// arrays are mapped element-wise; scalars pass through unchanged regardless
/// of selection shape (a scalar can't be narrowed further).
pub fn filter(data: &serde_json::Value, selection: &Selection) -> serde_json::Value {
    match selection {
        Selection::Include => data.clone(),
        Selection::Node { select, .. } => match data {
            serde_json::Value::Object(map) => {
                let mut out = serde_json::Map::new();
                if let Some(id) = map.get("id") {
                    out.insert("id".to_string(), id.clone());
                }
                for (field, child) in select {
                    if let Some(value) = map.get(field) {
                        out.insert(field.clone(), filter(value, child));
                    }
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|item| filter(item, selection)).collect())
            }
            scalar => scalar.clone(),
        },
    }
}
