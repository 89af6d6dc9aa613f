//! The reverse index of [`Dependencies`]: for a changed path, which declaring
//! fields have to be revalidated.
//!
//! Triggers are compiled against the live values because wildcard
//! dependencies expand to concrete indices. They are never patched, only
//! rebuilt from scratch when dependencies or array lengths change.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use crate::{
    dependencies::Dependencies,
    path::{Path, Seg},
    tree::{self, Tree},
};

#[derive(Clone, Debug, Default)]
struct TriggerNode {
    /// Fields revalidated when exactly this node changes.
    exact: Vec<Path>,
    /// Fields revalidated when this node or anything below it changes.
    subtree: Vec<Path>,
    children: IndexMap<Seg, TriggerNode>,
}

impl TriggerNode {
    fn node_mut(&mut self, path: &Path) -> &mut TriggerNode {
        path.iter().fold(self, |node, seg| {
            node.children.entry(seg.clone()).or_default()
        })
    }

    fn collect_all(&self, out: &mut Vec<Path>) {
        out.extend(self.exact.iter().cloned());
        out.extend(self.subtree.iter().cloned());
        for child in self.children.values() {
            child.collect_all(out);
        }
    }
}

fn push_unique(list: &mut Vec<Path>, field: &Path) {
    if !list.contains(field) {
        list.push(field.clone());
    }
}

/// Compiled triggers. Build with [`create_triggers`], query with
/// [`get_triggers`].
#[derive(Clone, Debug, Default)]
pub struct Triggers {
    root: TriggerNode,
}

impl Triggers {
    fn register(&mut self, dependency: &Path, field: &Path, subtree: bool) {
        let node = self.root.node_mut(dependency);
        if subtree {
            push_unique(&mut node.subtree, field);
        } else {
            push_unique(&mut node.exact, field);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.exact.is_empty() && self.root.subtree.is_empty() && self.root.children.is_empty()
    }
}

/// Expands each `*` in `dependency` against the array found at that point in
/// `values`. A wildcard with nothing to expand against is kept as is.
fn expand(dependency: &Path, values: &Value) -> Vec<Path> {
    let mut out = Vec::new();
    expand_into(dependency.segments(), Path::root(), values, &mut out);
    out
}

fn expand_into(rest: &[Seg], mut prefix: Path, values: &Value, out: &mut Vec<Path>) {
    let Some((seg, tail)) = rest.split_first() else {
        out.push(prefix);
        return;
    };
    if seg.is_wildcard() {
        let len = tree::get(&prefix, values)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        if len > 0 {
            for i in 0..len {
                expand_into(tail, prefix.child(i), values, out);
            }
            return;
        }
    }
    prefix.push(seg.clone());
    expand_into(tail, prefix, values, out);
}

/// Compiles the trigger index for `deps` against the current `values`.
///
/// A dependency on a container triggers on any change inside it, a
/// dependency on a leaf only on that leaf.
pub fn create_triggers(deps: &Dependencies, values: &Value) -> Triggers {
    let mut triggers = Triggers::default();
    let mut declared = 0usize;
    deps.for_each_declared(|field, list| {
        declared += 1;
        for dependency in list {
            for concrete in expand(dependency, values) {
                let subtree = concrete.has_wildcard()
                    || tree::get(&concrete, values).is_some_and(Value::is_container);
                triggers.register(&concrete, field, subtree);
            }
        }
    });
    debug!(declared, "compiled field triggers");
    triggers
}

/// Fields to revalidate when `path` changes, in first-seen order and never
/// including `path` itself.
pub fn get_triggers(path: &Path, triggers: &Triggers) -> Vec<Path> {
    let mut out = Vec::new();
    let mut nodes = vec![&triggers.root];
    for seg in path {
        let mut next = Vec::new();
        for node in nodes {
            out.extend(node.subtree.iter().cloned());
            next.extend(node.children.get(seg));
            if seg.as_index().is_some() {
                next.extend(node.children.get(&Seg::Wildcard));
            }
        }
        nodes = next;
    }
    for node in nodes {
        node.collect_all(&mut out);
    }

    let mut unique = Vec::with_capacity(out.len());
    for field in &out {
        if field != path {
            push_unique(&mut unique, field);
        }
    }
    unique
}

/// Scans the raw dependency tree for fields that depend on `path` or on
/// anything above or below it. Wildcards match any index.
pub fn find_triggers(path: &Path, deps: &Dependencies) -> Vec<Path> {
    let mut out = Vec::new();
    deps.for_each_declared(|field, list| {
        if field == path {
            return;
        }
        let hit = list
            .iter()
            .any(|dep| dep.starts_with_matching(path) || path.starts_with_matching(dep));
        if hit {
            push_unique(&mut out, field);
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn p(raw: &str) -> Path {
        Path::parse(raw)
    }

    fn strings(paths: Vec<Path>) -> Vec<String> {
        paths.into_iter().map(String::from).collect()
    }

    #[test]
    fn leaf_dependency_is_exact() {
        let deps = Dependencies::fields([("confirm", Dependencies::field(["password"]))]);
        let values = json!({"password": "", "confirm": ""});
        let triggers = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("password"), &triggers)), vec!["confirm"]);
        assert!(get_triggers(&p("confirm"), &triggers).is_empty());
    }

    #[test]
    fn container_dependency_covers_subtree() {
        let deps = Dependencies::fields([("total", Dependencies::field(["items"]))]);
        let values = json!({"items": [{"price": 1}], "total": 0});
        let triggers = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("items.0.price"), &triggers)), vec!["total"]);
        assert_eq!(strings(get_triggers(&p("items"), &triggers)), vec!["total"]);
    }

    #[test]
    fn wildcard_expands_against_values() {
        let deps = Dependencies::fields([("total", Dependencies::field(["items.*.price"]))]);
        let values = json!({"items": [{"price": 1}, {"price": 2}], "total": 0});
        let triggers = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("items.1.price"), &triggers)), vec!["total"]);
        assert!(get_triggers(&p("items.1.name"), &triggers).is_empty());
        // A whole element changing reaches the leaf trigger below it.
        assert_eq!(strings(get_triggers(&p("items.0"), &triggers)), vec!["total"]);
    }

    #[test]
    fn unexpanded_wildcard_matches_any_index() {
        let deps = Dependencies::fields([("total", Dependencies::field(["items.*.price"]))]);
        let values = json!({"items": [], "total": 0});
        let triggers = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("items.7.price"), &triggers)), vec!["total"]);
    }

    #[test]
    fn all_fields_declares_at_the_container() {
        let deps = Dependencies::fields([("lines", Dependencies::all_fields(["currency"]))]);
        let values = json!({"currency": "EUR", "lines": [{"amount": 1}]});
        let triggers = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("currency"), &triggers)), vec!["lines"]);
    }

    #[test]
    fn results_are_unique_and_ordered() {
        let deps = Dependencies::fields([
            ("a", Dependencies::field(["x", "x.y"])),
            ("b", Dependencies::field(["x.y"])),
            ("x", Dependencies::field(["x"])),
        ]);
        let values = json!({"x": {"y": 1}, "a": 0, "b": 0});
        let triggers = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("x.y"), &triggers)), vec!["a", "x", "b"]);
    }

    #[test]
    fn find_triggers_is_symmetric_with_declarations() {
        let deps = Dependencies::fields([
            ("confirm", Dependencies::field(["password"])),
            ("total", Dependencies::field(["items.*.price"])),
        ]);
        assert_eq!(strings(find_triggers(&p("password"), &deps)), vec!["confirm"]);
        assert_eq!(strings(find_triggers(&p("items.3.price"), &deps)), vec!["total"]);
        assert_eq!(strings(find_triggers(&p("items"), &deps)), vec!["total"]);
        assert!(find_triggers(&p("pass"), &deps).is_empty());
        assert!(find_triggers(&p("confirm"), &deps).is_empty());
    }

    #[test]
    fn rebuilt_after_reindex() {
        let deps = Dependencies::fields([("total", Dependencies::field(["items.*.price"]))]);
        let mut values = json!({"items": [{"price": 1}], "total": 0});
        let before = create_triggers(&deps, &values);
        assert!(get_triggers(&p("items.1.price"), &before).is_empty());

        tree::append(&p("items"), json!({"price": 5}), &mut values);
        let after = create_triggers(&deps, &values);
        assert_eq!(strings(get_triggers(&p("items.1.price"), &after)), vec!["total"]);
    }
}
