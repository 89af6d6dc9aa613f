//! Validator declarations and the resolver that turns them into work.
//!
//! A [`Validators`] tree mirrors the value tree. Resolving a path walks both
//! trees together and yields `(path, validator)` pairs in execution order:
//! ancestors' whole-value validators first, then per element the validator
//! shared by all elements before the element's own.

use std::{fmt, future::Future, rc::Rc};

use futures::{
    FutureExt,
    future::{LocalBoxFuture, join_all},
};
use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::{
    deep,
    error::{FormError, FormResult, ShapeMismatch},
    path::{Path, Seg},
    tree::{self, Tree},
};

/// What a validator sees besides the value: a snapshot of the form values
/// taken when the validator was invoked, and the path being validated.
#[derive(Clone, Debug)]
pub struct FieldContext {
    pub values: Rc<Value>,
    pub path: Path,
}

impl FieldContext {
    /// Reads another field from the snapshot.
    pub fn get(&self, path: impl Into<Path>) -> Option<&Value> {
        tree::get(&path.into(), self.values.as_ref())
    }
}

type ValidatorFn = dyn Fn(Value, FieldContext) -> LocalBoxFuture<'static, Option<String>>;

/// A validation function. `None` means the value is valid, `Some(message)`
/// is the error shown for the field.
#[derive(Clone)]
pub struct Validator(Rc<ValidatorFn>);

impl Validator {
    pub fn new(f: impl Fn(&Value, &FieldContext) -> Option<String> + 'static) -> Self {
        Self(Rc::new(move |value, cx| {
            let result = f(&value, &cx);
            async move { result }.boxed_local()
        }))
    }

    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, FieldContext) -> Fut + 'static,
        Fut: Future<Output = Option<String>> + 'static,
    {
        Self(Rc::new(move |value, cx| f(value, cx).boxed_local()))
    }

    pub fn call(&self, value: Value, cx: FieldContext) -> LocalBoxFuture<'static, Option<String>> {
        (self.0)(value, cx)
    }

    pub fn ptr_eq(&self, other: &Validator) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Markers carried by a container node.
#[derive(Clone, Debug, Default)]
pub struct Modifiers {
    /// Validates the container's whole value.
    pub this: Option<Validator>,
    /// Applies to every element of an array.
    pub all: Option<Box<Validators>>,
    /// Per-index or per-key children, applied after `all`.
    pub values: Option<Box<Validators>>,
}

/// The validator tree.
#[derive(Clone, Debug, Default)]
pub enum Validators {
    #[default]
    Empty,
    Field(Validator),
    Fields(IndexMap<String, Validators>),
    /// Per-index validators for an array value.
    Items(Vec<Validators>),
    Modified(Modifiers),
}

impl Validators {
    pub fn field(f: impl Fn(&Value, &FieldContext) -> Option<String> + 'static) -> Self {
        Validators::Field(Validator::new(f))
    }

    pub fn field_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, FieldContext) -> Fut + 'static,
        Fut: Future<Output = Option<String>> + 'static,
    {
        Validators::Field(Validator::new_async(f))
    }

    pub fn fields<K: Into<String>>(entries: impl IntoIterator<Item = (K, Validators)>) -> Self {
        Validators::Fields(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn items(items: impl IntoIterator<Item = Validators>) -> Self {
        Validators::Items(items.into_iter().collect())
    }

    fn into_modifiers(self) -> Modifiers {
        match self {
            Validators::Modified(m) => m,
            Validators::Empty => Modifiers::default(),
            Validators::Field(this) => Modifiers {
                this: Some(this),
                ..Modifiers::default()
            },
            children => Modifiers {
                values: Some(Box::new(children)),
                ..Modifiers::default()
            },
        }
    }

    /// Adds a whole-value validator to this node. Existing children move
    /// under the values marker.
    pub fn with_this(self, this: Validator) -> Self {
        let mut m = self.into_modifiers();
        m.this = Some(this);
        Validators::Modified(m)
    }

    /// Adds a node applied to every array element.
    pub fn with_all(self, all: Validators) -> Self {
        let mut m = self.into_modifiers();
        m.all = Some(Box::new(all));
        Validators::Modified(m)
    }

    /// Sets the per-index or per-key children.
    pub fn with_values(self, values: Validators) -> Self {
        let mut m = self.into_modifiers();
        m.values = Some(Box::new(values));
        Validators::Modified(m)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Validators::Empty)
    }
}

impl Tree for Validators {
    fn new_object() -> Self {
        Validators::Fields(IndexMap::new())
    }

    fn new_array() -> Self {
        Validators::Items(Vec::new())
    }

    fn placeholder() -> Self {
        Validators::Empty
    }

    fn is_container(&self) -> bool {
        matches!(
            self,
            Validators::Fields(_) | Validators::Items(_) | Validators::Modified(_)
        )
    }

    fn child(&self, seg: &Seg) -> Option<&Self> {
        match (self, seg) {
            (_, Seg::Wildcard) => None,
            (Validators::Fields(map), _) => map.get(&seg.object_key()),
            (Validators::Items(items), Seg::Index(i)) => items.get(*i),
            (Validators::Modified(m), _) => m.values.as_deref()?.child(seg),
            _ => None,
        }
    }

    fn child_mut(&mut self, seg: &Seg) -> Option<&mut Self> {
        match (self, seg) {
            (_, Seg::Wildcard) => None,
            (Validators::Fields(map), _) => map.get_mut(&seg.object_key()),
            (Validators::Items(items), Seg::Index(i)) => items.get_mut(*i),
            (Validators::Modified(m), _) => m.values.as_deref_mut()?.child_mut(seg),
            _ => None,
        }
    }

    fn put(&mut self, seg: &Seg, value: Self) -> bool {
        match (self, seg) {
            (_, Seg::Wildcard) => false,
            (Validators::Fields(map), _) => {
                map.insert(seg.object_key(), value);
                true
            }
            (Validators::Items(items), Seg::Index(i)) => {
                let padded = tree::pad_to_index(items, *i);
                if padded {
                    items[*i] = value;
                }
                padded
            }
            (Validators::Modified(m), _) => {
                let values = m.values.get_or_insert_with(|| {
                    Box::new(match seg {
                        Seg::Index(_) => Validators::new_array(),
                        _ => Validators::new_object(),
                    })
                });
                values.put(seg, value)
            }
            _ => false,
        }
    }

    fn take(&mut self, seg: &Seg) -> Option<Self> {
        match (self, seg) {
            (_, Seg::Wildcard) => None,
            (Validators::Fields(map), _) => map.shift_remove(&seg.object_key()),
            (Validators::Items(items), Seg::Index(i)) if *i < items.len() => Some(items.remove(*i)),
            (Validators::Modified(m), _) => m.values.as_deref_mut()?.take(seg),
            _ => None,
        }
    }

    fn as_array_mut(&mut self) -> Option<&mut Vec<Self>> {
        match self {
            Validators::Items(items) => Some(items),
            Validators::Modified(m) => m.values.as_deref_mut()?.as_array_mut(),
            _ => None,
        }
    }
}

/// Resolves the validators that apply to `path`, in execution order.
///
/// Whole-value validators of every ancestor come first, outermost first.
/// The node reached at `path` then contributes everything below it.
pub fn get_validators(
    path: &Path,
    validators: &Validators,
    values: &Value,
) -> FormResult<Vec<(Path, Validator)>> {
    let mut out = Vec::new();
    let mut nodes: SmallVec<[&Validators; 2]> = SmallVec::new();
    nodes.push(validators);
    let mut here = Path::root();

    for seg in path {
        let value_here = tree::get(&here, values);
        let mut next = SmallVec::new();
        for node in nodes {
            match node {
                Validators::Field(_) if value_here.is_some_and(Value::is_container) => {
                    return Err(FormError::shape_mismatch(
                        here,
                        ShapeMismatch::FunctionForContainer,
                    ));
                }
                Validators::Modified(m) => {
                    if let Some(this) = &m.this {
                        out.push((here.clone(), this.clone()));
                    }
                    if let (Some(all), Seg::Index(_)) = (&m.all, seg) {
                        next.push(all.as_ref());
                    }
                    next.extend(m.values.as_deref().and_then(|v| v.child(seg)));
                }
                other => next.extend(other.child(seg)),
            }
        }
        if next.is_empty() {
            return Ok(out);
        }
        nodes = next;
        here.push(seg.clone());
    }

    let value = tree::get(&here, values);
    for node in nodes {
        collect(node, &here, value, &mut out)?;
    }
    Ok(out)
}

fn collect(
    node: &Validators,
    here: &Path,
    value: Option<&Value>,
    out: &mut Vec<(Path, Validator)>,
) -> FormResult<()> {
    let mismatch = |kind| Err(FormError::shape_mismatch(here.clone(), kind));
    match node {
        Validators::Empty => Ok(()),
        Validators::Field(validator) => {
            if value.is_some_and(Value::is_container) {
                return mismatch(ShapeMismatch::FunctionForContainer);
            }
            out.push((here.clone(), validator.clone()));
            Ok(())
        }
        Validators::Fields(map) => match value {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Object(object)) => {
                for (key, child_value) in object {
                    if let Some(child) = map.get(key) {
                        collect(child, &here.child(key.as_str()), Some(child_value), out)?;
                    }
                }
                Ok(())
            }
            Some(Value::Array(_)) => mismatch(ShapeMismatch::ContainerKind),
            Some(_) => mismatch(ShapeMismatch::ContainerForPrimitive),
        },
        Validators::Items(items) => match value {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Array(array)) => {
                for (i, (child, child_value)) in items.iter().zip(array).enumerate() {
                    collect(child, &here.child(i), Some(child_value), out)?;
                }
                Ok(())
            }
            Some(Value::Object(_)) => mismatch(ShapeMismatch::ContainerKind),
            Some(_) => mismatch(ShapeMismatch::ContainerForPrimitive),
        },
        Validators::Modified(m) => {
            if let Some(this) = &m.this {
                out.push((here.clone(), this.clone()));
            }
            match value {
                None | Some(Value::Null) => Ok(()),
                Some(Value::Array(array)) => {
                    for (i, child_value) in array.iter().enumerate() {
                        let child_path = here.child(i);
                        if let Some(all) = &m.all {
                            collect(all, &child_path, Some(child_value), out)?;
                        }
                        let own = m.values.as_deref().and_then(|v| v.child(&Seg::Index(i)));
                        if let Some(own) = own {
                            collect(own, &child_path, Some(child_value), out)?;
                        }
                    }
                    Ok(())
                }
                Some(Value::Object(_)) => {
                    if m.all.is_some() {
                        return mismatch(ShapeMismatch::ContainerKind);
                    }
                    match m.values.as_deref() {
                        Some(children) => collect(children, here, value, out),
                        None => Ok(()),
                    }
                }
                Some(_) if m.all.is_some() || m.values.is_some() => {
                    mismatch(ShapeMismatch::ContainerForPrimitive)
                }
                Some(_) => Ok(()),
            }
        }
    }
}

/// Runs each resolved validator against the current value at its path.
///
/// Every validator gets the same snapshot of `values`. Results come back in
/// resolution order.
pub async fn run_validators(
    resolved: Vec<(Path, Validator)>,
    values: Rc<Value>,
) -> Vec<(Path, Option<String>)> {
    let pending = resolved.into_iter().map(|(path, validator)| {
        let value = tree::get(&path, values.as_ref()).cloned().unwrap_or(Value::Null);
        let cx = FieldContext {
            values: values.clone(),
            path: path.clone(),
        };
        validator.call(value, cx).map(move |result| (path, result))
    });
    join_all(pending).await
}

/// Folds raw results into one result per path, keeping first-seen path
/// order. The first error reported for a path wins.
pub fn group_results(
    results: impl IntoIterator<Item = (Path, Option<String>)>,
) -> Vec<(Path, Option<String>)> {
    let mut grouped: IndexMap<Path, Option<String>> = IndexMap::new();
    for (path, result) in results {
        let slot = grouped.entry(path).or_insert(None);
        if slot.is_none() {
            *slot = result;
        }
    }
    grouped.into_iter().collect()
}

/// Writes grouped results into an error tree.
///
/// Deeper paths are written before their ancestors. A passing container
/// leaves an existing error subtree in place; an error on a container
/// replaces it.
pub fn write_errors(errors: &mut Value, mut grouped: Vec<(Path, Option<String>)>) {
    grouped.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
    for (path, result) in grouped {
        match result {
            Some(message) => {
                tree::set(&path, Value::String(message), errors);
            }
            None => {
                if tree::get(&path, errors).is_some_and(Value::is_container) {
                    continue;
                }
                tree::set(&path, Value::Bool(false), errors);
            }
        }
    }
}

/// Validates the whole form without touching any state.
///
/// Returns whether every validator passed, and an error tree shaped like
/// `values` with `false` wherever nothing failed.
pub async fn is_form_valid_schemaless(
    validators: &Validators,
    values: &Value,
) -> FormResult<(bool, Value)> {
    let resolved = get_validators(&Path::root(), validators, values)?;
    let results = run_validators(resolved, Rc::new(values.clone())).await;
    let valid = results.iter().all(|(_, result)| result.is_none());
    let mut errors = deep::assign(&Value::Bool(false), values);
    write_errors(&mut errors, group_results(results));
    Ok((valid, errors))
}

/// True if any node of an error tree holds a message.
pub fn has_errors(errors: &Value) -> bool {
    deep::some_deep(&Value::is_string, errors)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::executor::block_on;
    use serde_json::json;

    use super::*;

    fn required() -> Validators {
        Validators::field(|v, _| {
            v.as_str()
                .is_some_and(str::is_empty)
                .then(|| "Required".to_string())
        })
    }

    /// Validator that records `tag` when resolved and run.
    fn tagged(log: &Rc<RefCell<Vec<String>>>, tag: &str) -> Validator {
        let log = log.clone();
        let tag = tag.to_string();
        Validator::new(move |_, cx| {
            log.borrow_mut().push(format!("{tag}@{}", cx.path));
            None
        })
    }

    fn paths(resolved: &[(Path, Validator)]) -> Vec<String> {
        resolved.iter().map(|(p, _)| p.to_string()).collect()
    }

    #[test]
    fn this_all_values_ordering() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let validators = Validators::fields([(
            "list",
            Validators::Empty
                .with_this(tagged(&log, "this"))
                .with_all(Validators::Field(tagged(&log, "all")))
                .with_values(Validators::items([
                    Validators::Field(tagged(&log, "values")),
                    Validators::Field(tagged(&log, "values")),
                ])),
        )]);
        let values = json!({"list": ["a", "b"]});

        let resolved = get_validators(&Path::parse("list"), &validators, &values).unwrap();
        block_on(run_validators(resolved, Rc::new(values)));
        assert_eq!(
            *log.borrow(),
            vec!["this@list", "all@list.0", "values@list.0", "all@list.1", "values@list.1"]
        );
    }

    #[test]
    fn ancestor_this_precedes_descent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let validators = Validators::fields([(
            "address",
            Validators::fields([("zip", Validators::Field(tagged(&log, "zip")))])
                .with_this(tagged(&log, "address")),
        )]);
        let values = json!({"address": {"zip": "1"}});
        let resolved = get_validators(&Path::parse("address.zip"), &validators, &values).unwrap();
        assert_eq!(paths(&resolved), vec!["address", "address.zip"]);
    }

    #[test]
    fn element_path_goes_through_all_and_values() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let validators = Validators::fields([(
            "items",
            Validators::Empty
                .with_this(tagged(&log, "this"))
                .with_all(Validators::fields([("price", Validators::Field(tagged(&log, "all")))]))
                .with_values(Validators::items([
                    Validators::Empty,
                    Validators::fields([("price", Validators::Field(tagged(&log, "own")))]),
                ])),
        )]);
        let values = json!({"items": [{"price": 1}, {"price": 2}]});

        let resolved = get_validators(&Path::parse("items.1.price"), &validators, &values).unwrap();
        block_on(run_validators(resolved, Rc::new(values)));
        assert_eq!(*log.borrow(), vec!["this@items", "all@items.1.price", "own@items.1.price"]);
    }

    #[test]
    fn legacy_items_shorthand() {
        let validators = Validators::fields([(
            "pair",
            Validators::items([required(), Validators::Empty, required()]),
        )]);
        let values = json!({"pair": ["", "x"]});
        let resolved = get_validators(&Path::parse("pair"), &validators, &values).unwrap();
        assert_eq!(paths(&resolved), vec!["pair.0"]);
    }

    #[test]
    fn objects_follow_value_key_order() {
        let validators = Validators::fields([("b", required()), ("a", required())]);
        let values = json!({"a": "", "b": "", "c": ""});
        let resolved = get_validators(&Path::root(), &validators, &values).unwrap();
        assert_eq!(paths(&resolved), vec!["a", "b"]);
    }

    #[test]
    fn missing_validator_resolves_to_nothing() {
        let validators = Validators::fields([("a", required())]);
        let values = json!({"a": "", "b": {"c": 1}});
        assert!(get_validators(&Path::parse("b.c"), &validators, &values).unwrap().is_empty());
        assert!(get_validators(&Path::parse("zz"), &validators, &values).unwrap().is_empty());
    }

    #[test]
    fn shape_mismatch_both_directions() {
        let values = json!({"a": {"b": 1}, "n": 3, "l": [1]});

        let function_for_object = Validators::fields([("a", required())]);
        match get_validators(&Path::parse("a"), &function_for_object, &values) {
            Err(FormError::ValidatorShapeMismatch { path, kind }) => {
                assert_eq!(path, Path::parse("a"));
                assert_eq!(kind, ShapeMismatch::FunctionForContainer);
            }
            other => panic!("unexpected {other:?}"),
        }

        let object_for_number = Validators::fields([("n", Validators::fields([("x", required())]))]);
        assert!(matches!(
            get_validators(&Path::root(), &object_for_number, &values),
            Err(FormError::ValidatorShapeMismatch {
                kind: ShapeMismatch::ContainerForPrimitive,
                ..
            })
        ));

        let object_for_array = Validators::fields([("l", Validators::fields([("x", required())]))]);
        assert!(matches!(
            get_validators(&Path::root(), &object_for_array, &values),
            Err(FormError::ValidatorShapeMismatch {
                kind: ShapeMismatch::ContainerKind,
                ..
            })
        ));
    }

    #[test]
    fn validators_tree_ops() {
        let mut validators = Validators::fields([(
            "roles",
            Validators::Empty.with_all(required()),
        )]);
        tree::set(&Path::parse("roles.2"), required(), &mut validators);
        let roles = tree::get(&Path::parse("roles"), &validators).unwrap();
        match roles {
            Validators::Modified(m) => match m.values.as_deref() {
                Some(Validators::Items(items)) => {
                    assert_eq!(items.len(), 3);
                    assert!(items[0].is_empty());
                    assert!(matches!(items[2], Validators::Field(_)));
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(tree::remove(&Path::parse("roles.0"), &mut validators).is_some());
        assert!(tree::get(&Path::parse("roles.1"), &validators).is_some());
        assert!(tree::get(&Path::parse("roles.2"), &validators).is_none());
    }

    #[test]
    fn schemaless_name_email() {
        let validators = Validators::fields([("name", required()), ("email", required())]);

        let (valid, errors) =
            block_on(is_form_valid_schemaless(&validators, &json!({"name": "a", "email": "b"})))
                .unwrap();
        assert!(valid);
        assert_eq!(errors, json!({"name": false, "email": false}));

        let (valid, errors) =
            block_on(is_form_valid_schemaless(&validators, &json!({"name": "a", "email": ""})))
                .unwrap();
        assert!(!valid);
        assert_eq!(errors, json!({"name": false, "email": "Required"}));
        assert!(has_errors(&errors));
    }

    #[test]
    fn first_error_per_path_wins() {
        let grouped = group_results([
            (Path::parse("a"), None),
            (Path::parse("a"), Some("first".into())),
            (Path::parse("b"), None),
            (Path::parse("a"), Some("second".into())),
        ]);
        assert_eq!(
            grouped,
            vec![(Path::parse("a"), Some("first".into())), (Path::parse("b"), None)]
        );
    }

    #[test]
    fn passing_container_keeps_child_errors() {
        let mut errors = json!({});
        write_errors(
            &mut errors,
            vec![
                (Path::parse("list"), None),
                (Path::parse("list.0"), Some("bad".into())),
                (Path::parse("list.1"), None),
            ],
        );
        assert_eq!(errors, json!({"list": ["bad", false]}));
    }

    #[test]
    fn async_validator_sees_snapshot() {
        let validators = Validators::fields([(
            "confirm",
            Validators::field_async(|value, cx| async move {
                (cx.get("password") != Some(&value)).then(|| "Mismatch".to_string())
            }),
        )]);
        let (valid, errors) = block_on(is_form_valid_schemaless(
            &validators,
            &json!({"password": "x", "confirm": "y"}),
        ))
        .unwrap();
        assert!(!valid);
        assert_eq!(errors["confirm"], json!("Mismatch"));
    }
}
