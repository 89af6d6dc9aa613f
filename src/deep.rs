//! Whole-tree helpers over [`serde_json::Value`].
//!
//! These build the shadow trees (`assign`), merge partial trees into full ones
//! (`merge_right_deep`, `assign_using`) and answer the aggregate questions
//! (`some_deep`).

use serde_json::{Map, Value};

use crate::error::{FormError, FormResult};

/// A same-kind empty container: `[]`, `{}` or `""`. Anything else has no
/// empty form and yields `None`.
pub fn empty(value: &Value) -> Option<Value> {
    match value {
        Value::Array(_) => Some(Value::Array(Vec::new())),
        Value::Object(_) => Some(Value::Object(Map::new())),
        Value::String(_) => Some(Value::String(String::new())),
        _ => None,
    }
}

/// Builds a tree congruent to `shape` with every leaf replaced by a clone of
/// `value`. Empty containers stay empty.
pub fn assign(value: &Value, shape: &Value) -> Value {
    match shape {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), assign(value, child)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| assign(value, item)).collect()),
        _ => value.clone(),
    }
}

/// Key policy for [`assign_using`].
#[derive(Clone, Debug, Default)]
pub struct AssignUsing {
    /// Keys copied verbatim from the right side even when `left` lacks them.
    pub use_keys: Vec<String>,
    /// Keys whose right-side subtree is matched against `left` itself.
    pub compare_keys: Vec<String>,
}

/// Intersection-shaped merge: the result has the shape of `left`, taking
/// `right`'s value wherever both sides have the node and their kinds agree.
pub fn assign_using(left: &Value, right: &Value, opts: &AssignUsing) -> Value {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let mut out = Map::new();
            for (key, left_child) in l {
                let merged = match r.get(key) {
                    Some(right_child) => assign_using(left_child, right_child, opts),
                    None => left_child.clone(),
                };
                out.insert(key.clone(), merged);
            }
            for (key, right_child) in r {
                if l.contains_key(key) {
                    continue;
                }
                if opts.use_keys.iter().any(|k| k == key) {
                    out.insert(key.clone(), right_child.clone());
                } else if opts.compare_keys.iter().any(|k| k == key) {
                    out.insert(key.clone(), assign_using(left, right_child, opts));
                }
            }
            Value::Object(out)
        }
        (Value::Array(l), Value::Array(r)) => Value::Array(
            l.iter()
                .enumerate()
                .map(|(i, left_child)| match r.get(i) {
                    Some(right_child) => assign_using(left_child, right_child, opts),
                    None => left_child.clone(),
                })
                .collect(),
        ),
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
            left.clone()
        }
        _ => right.clone(),
    }
}

/// Prunes `tree` to the nodes that still exist in `shape`. Leaves of `tree`
/// are kept whatever `shape` holds there; a container whose counterpart is of
/// another kind is dropped (`None`), or nulled inside an array.
pub fn retain_shape(tree: &Value, shape: &Value) -> Option<Value> {
    match (tree, shape) {
        (Value::Object(t), Value::Object(s)) => Some(Value::Object(
            t.iter()
                .filter_map(|(key, child)| {
                    let kept = retain_shape(child, s.get(key)?)?;
                    Some((key.clone(), kept))
                })
                .collect(),
        )),
        (Value::Array(t), Value::Array(s)) => Some(Value::Array(
            t.iter()
                .zip(s)
                .map(|(child, shape)| retain_shape(child, shape).unwrap_or(Value::Null))
                .collect(),
        )),
        (Value::Object(_) | Value::Array(_), _) => None,
        (leaf, _) => Some(leaf.clone()),
    }
}

/// Flags for [`merge_right_deep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
    /// Right arrays replace left arrays instead of merging element-wise.
    pub replace_arrays: bool,
    /// Skip keys that `left` does not have.
    pub only_same_keys: bool,
    /// Skip keys that `left` already has.
    pub only_new_keys: bool,
    /// Never overwrite with a right-side `null`.
    pub no_undefined_merges: bool,
}

impl MergeOptions {
    pub fn replace_arrays(mut self, replace: bool) -> Self {
        self.replace_arrays = replace;
        self
    }

    pub fn only_same_keys(mut self, only: bool) -> Self {
        self.only_same_keys = only;
        self
    }

    pub fn only_new_keys(mut self, only: bool) -> Self {
        self.only_new_keys = only;
        self
    }

    pub fn no_undefined_merges(mut self, skip: bool) -> Self {
        self.no_undefined_merges = skip;
        self
    }
}

/// Merges `right` into `left` in place; `right` wins on conflicts.
///
/// Containers of the same kind on both sides are always merged recursively;
/// the key filters decide which entries below them get written.
///
/// Fails with [`FormError::Config`] when both `only_same_keys` and
/// `only_new_keys` are set.
pub fn merge_right_deep(left: &mut Value, right: &Value, opts: MergeOptions) -> FormResult<()> {
    if opts.only_same_keys && opts.only_new_keys {
        return Err(FormError::config(
            "merge_right_deep: only_same_keys and only_new_keys are mutually exclusive",
        ));
    }
    merge_into(left, right, opts);
    Ok(())
}

fn merge_into(left: &mut Value, right: &Value, opts: MergeOptions) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, right_child) in r {
                if opts.no_undefined_merges && right_child.is_null() {
                    continue;
                }
                match l.get_mut(key) {
                    Some(left_child) if both_containers(left_child, right_child) => {
                        merge_into(left_child, right_child, opts)
                    }
                    Some(_) if opts.only_new_keys => {}
                    Some(left_child) => merge_into(left_child, right_child, opts),
                    None if opts.only_same_keys => {}
                    None => {
                        l.insert(key.clone(), right_child.clone());
                    }
                }
            }
        }
        (Value::Array(l), Value::Array(r)) if !opts.replace_arrays => {
            for (i, right_child) in r.iter().enumerate() {
                if opts.no_undefined_merges && right_child.is_null() {
                    continue;
                }
                match l.get_mut(i) {
                    Some(left_child) if both_containers(left_child, right_child) => {
                        merge_into(left_child, right_child, opts)
                    }
                    Some(_) if opts.only_new_keys => {}
                    Some(left_child) => merge_into(left_child, right_child, opts),
                    None if opts.only_same_keys => {}
                    None => {
                        crate::tree::pad_array(l, i);
                        l.push(right_child.clone());
                    }
                }
            }
        }
        (left, right) => {
            if !(opts.no_undefined_merges && right.is_null()) {
                *left = right.clone();
            }
        }
    }
}

fn both_containers(left: &Value, right: &Value) -> bool {
    matches!(
        (left, right),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    )
}

/// True if `pred` holds for any node in `tree`, containers included.
pub fn some_deep(pred: &impl Fn(&Value) -> bool, tree: &Value) -> bool {
    if pred(tree) {
        return true;
    }
    match tree {
        Value::Object(map) => map.values().any(|child| some_deep(pred, child)),
        Value::Array(items) => items.iter().any(|child| some_deep(pred, child)),
        _ => false,
    }
}

/// Builds the dirty tree: congruent to `current`, `true` at every leaf that
/// differs from the matching node of `baseline`.
pub fn diff_dirty(current: &Value, baseline: Option<&Value>) -> Value {
    match current {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| {
                    let base = baseline.and_then(|b| b.get(key));
                    (key.clone(), diff_dirty(child, base))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, child)| diff_dirty(child, baseline.and_then(|b| b.get(i))))
                .collect(),
        ),
        leaf => Value::Bool(baseline != Some(leaf)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{path::Path, tree};

    fn leaf_paths(tree: &Value, prefix: Path, out: &mut Vec<Path>) {
        match tree {
            Value::Object(map) => {
                for (key, child) in map {
                    leaf_paths(child, prefix.child(key.as_str()), out);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    leaf_paths(child, prefix.child(i), out);
                }
            }
            _ => out.push(prefix),
        }
    }

    #[test]
    fn empty_matches_kind() {
        assert_eq!(empty(&json!([1])), Some(json!([])));
        assert_eq!(empty(&json!({"a": 1})), Some(json!({})));
        assert_eq!(empty(&json!("abc")), Some(json!("")));
        assert_eq!(empty(&json!(3)), None);
        assert_eq!(empty(&Value::Null), None);
    }

    #[test]
    fn assign_is_shape_congruent() {
        let shape = json!({"name": "x", "roles": ["a", "b"], "address": {"zip": 1, "tags": []}});
        let assigned = assign(&json!(false), &shape);
        assert_eq!(
            assigned,
            json!({"name": false, "roles": [false, false], "address": {"zip": false, "tags": []}})
        );

        let mut expected = Vec::new();
        leaf_paths(&shape, Path::root(), &mut expected);
        let mut actual = Vec::new();
        leaf_paths(&assigned, Path::root(), &mut actual);
        assert_eq!(expected, actual);
    }

    #[test]
    fn set_get_round_trip_over_assigned_tree() {
        let shape = json!({"a": {"b": [1, 2]}, "c": "x"});
        let mut container = assign(&Value::Null, &shape);
        let mut paths = Vec::new();
        leaf_paths(&shape, Path::root(), &mut paths);
        for path in paths {
            tree::set(&path, json!("written"), &mut container);
            assert_eq!(tree::get(&path, &container), Some(&json!("written")));
        }
    }

    #[test]
    fn assign_using_takes_left_shape() {
        let left = json!({"name": false, "roles": [false, false]});
        let right = json!({"name": true, "roles": [true], "extra": true});
        assert_eq!(
            assign_using(&left, &right, &AssignUsing::default()),
            json!({"name": true, "roles": [true, false]})
        );
    }

    #[test]
    fn assign_using_marker_keys() {
        let left = json!({"a": 1});
        let right = json!({"a": 2, "keep": {"x": 1}, "cmp": {"a": 5, "z": 0}});
        let opts = AssignUsing {
            use_keys: vec!["keep".into()],
            compare_keys: vec!["cmp".into()],
        };
        assert_eq!(
            assign_using(&left, &right, &opts),
            json!({"a": 2, "keep": {"x": 1}, "cmp": {"a": 5}})
        );
    }

    #[test]
    fn retain_shape_drops_vanished_nodes() {
        let errors = json!({"roles": [false, "Required", "Taken"], "name": "Short", "tags": {"a": 1}});
        let values = json!({"roles": ["a"], "name": "x", "tags": []});
        assert_eq!(
            retain_shape(&errors, &values),
            Some(json!({"roles": [false], "name": "Short"}))
        );
        assert_eq!(retain_shape(&json!("Too few"), &json!(["a"])), Some(json!("Too few")));
        assert_eq!(retain_shape(&json!([false]), &json!("a")), None);
    }

    #[test]
    fn merge_right_wins_and_merges_arrays() {
        let mut left = json!({"a": 1, "b": {"c": [1, 2, 3]}});
        let right = json!({"a": 2, "b": {"c": [9]}, "d": true});
        merge_right_deep(&mut left, &right, MergeOptions::default()).unwrap();
        assert_eq!(left, json!({"a": 2, "b": {"c": [9, 2, 3]}, "d": true}));
    }

    #[test]
    fn merge_replace_arrays() {
        let mut left = json!({"c": [1, 2, 3]});
        merge_right_deep(&mut left, &json!({"c": [9]}), MergeOptions::default().replace_arrays(true))
            .unwrap();
        assert_eq!(left, json!({"c": [9]}));
    }

    #[test]
    fn merge_key_filters() {
        let right = json!({"a": 2, "new": 1});

        let mut same = json!({"a": 1});
        merge_right_deep(&mut same, &right, MergeOptions::default().only_same_keys(true)).unwrap();
        assert_eq!(same, json!({"a": 2}));

        let mut fresh = json!({"a": 1});
        merge_right_deep(&mut fresh, &right, MergeOptions::default().only_new_keys(true)).unwrap();
        assert_eq!(fresh, json!({"a": 1, "new": 1}));
    }

    #[test]
    fn key_filters_apply_below_shared_containers() {
        let mut errors = json!({"address": {"zip": "Required"}});
        let base = json!({"address": {"zip": false, "street": false}, "name": false});
        merge_right_deep(&mut errors, &base, MergeOptions::default().only_new_keys(true)).unwrap();
        assert_eq!(
            errors,
            json!({"address": {"zip": "Required", "street": false}, "name": false})
        );
    }

    #[test]
    fn merge_skips_nulls_when_asked() {
        let mut left = json!({"a": 1, "b": [1]});
        let right = json!({"a": null, "b": [null]});
        merge_right_deep(&mut left, &right, MergeOptions::default().no_undefined_merges(true))
            .unwrap();
        assert_eq!(left, json!({"a": 1, "b": [1]}));
    }

    #[test]
    fn merge_rejects_conflicting_filters() {
        let mut left = json!({});
        let opts = MergeOptions::default().only_same_keys(true).only_new_keys(true);
        assert!(matches!(
            merge_right_deep(&mut left, &json!({"a": 1}), opts),
            Err(FormError::Config(_))
        ));
        assert_eq!(left, json!({}));
    }

    #[test]
    fn some_deep_tests_containers_too() {
        let tree = json!({"a": [false, {"b": false}], "c": false});
        assert!(!some_deep(&|v| v == &json!(true), &tree));
        assert!(some_deep(&|v| v.is_array(), &tree));
        assert!(some_deep(&|v| v.is_string(), &json!({"x": [false, "Required"]})));
    }

    #[test]
    fn diff_dirty_is_leaf_wise() {
        let baseline = json!({"name": "a", "roles": ["user"]});
        let current = json!({"name": "a", "roles": ["user", "admin"]});
        assert_eq!(
            diff_dirty(&current, Some(&baseline)),
            json!({"name": false, "roles": [false, true]})
        );
    }
}
