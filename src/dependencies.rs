//! Cross-field dependency declarations.
//!
//! A field that depends on other fields is revalidated whenever one of them
//! changes. The tree mirrors the value tree like [`Validators`] does.
//!
//! [`Validators`]: crate::Validators

use indexmap::IndexMap;

use crate::{
    path::{Path, Seg},
    tree::{self, Tree},
};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Dependencies {
    #[default]
    Empty,
    /// The paths this field depends on. Paths may contain `*` segments.
    Field(Vec<Path>),
    Fields(IndexMap<String, Dependencies>),
    Items(Vec<Dependencies>),
    /// Dependencies of the container as a whole, plus optional per-child
    /// declarations.
    AllFields {
        deps: Vec<Path>,
        values: Option<Box<Dependencies>>,
    },
}

impl Dependencies {
    pub fn field<P: Into<Path>>(deps: impl IntoIterator<Item = P>) -> Self {
        Dependencies::Field(deps.into_iter().map(Into::into).collect())
    }

    pub fn fields<K: Into<String>>(entries: impl IntoIterator<Item = (K, Dependencies)>) -> Self {
        Dependencies::Fields(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn items(items: impl IntoIterator<Item = Dependencies>) -> Self {
        Dependencies::Items(items.into_iter().collect())
    }

    pub fn all_fields<P: Into<Path>>(deps: impl IntoIterator<Item = P>) -> Self {
        Dependencies::AllFields {
            deps: deps.into_iter().map(Into::into).collect(),
            values: None,
        }
    }

    /// Attaches per-child declarations to an [`Dependencies::AllFields`]
    /// node. Any other node is replaced by `values`.
    pub fn with_values(self, children: Dependencies) -> Self {
        match self {
            Dependencies::AllFields { deps, .. } => Dependencies::AllFields {
                deps,
                values: Some(Box::new(children)),
            },
            _ => children,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Dependencies::Empty)
    }

    /// Calls `f` with every declaring field and its dependency list, in
    /// declaration order.
    pub fn for_each_declared(&self, mut f: impl FnMut(&Path, &[Path])) {
        fn walk(node: &Dependencies, here: &mut Path, f: &mut dyn FnMut(&Path, &[Path])) {
            match node {
                Dependencies::Empty => {}
                Dependencies::Field(deps) => f(here, deps),
                Dependencies::Fields(map) => {
                    for (key, child) in map {
                        here.push(Seg::parse(key));
                        walk(child, here, f);
                        here.pop();
                    }
                }
                Dependencies::Items(items) => {
                    for (i, child) in items.iter().enumerate() {
                        here.push(Seg::Index(i));
                        walk(child, here, f);
                        here.pop();
                    }
                }
                Dependencies::AllFields { deps, values } => {
                    f(here, deps);
                    if let Some(values) = values {
                        walk(values, here, f);
                    }
                }
            }
        }
        walk(self, &mut Path::root(), &mut f);
    }
}

impl Tree for Dependencies {
    fn new_object() -> Self {
        Dependencies::Fields(IndexMap::new())
    }

    fn new_array() -> Self {
        Dependencies::Items(Vec::new())
    }

    fn placeholder() -> Self {
        Dependencies::Empty
    }

    fn is_container(&self) -> bool {
        matches!(
            self,
            Dependencies::Fields(_) | Dependencies::Items(_) | Dependencies::AllFields { .. }
        )
    }

    fn child(&self, seg: &Seg) -> Option<&Self> {
        match (self, seg) {
            (_, Seg::Wildcard) => None,
            (Dependencies::Fields(map), _) => map.get(&seg.object_key()),
            (Dependencies::Items(items), Seg::Index(i)) => items.get(*i),
            (Dependencies::AllFields { values, .. }, _) => values.as_deref()?.child(seg),
            _ => None,
        }
    }

    fn child_mut(&mut self, seg: &Seg) -> Option<&mut Self> {
        match (self, seg) {
            (_, Seg::Wildcard) => None,
            (Dependencies::Fields(map), _) => map.get_mut(&seg.object_key()),
            (Dependencies::Items(items), Seg::Index(i)) => items.get_mut(*i),
            (Dependencies::AllFields { values, .. }, _) => values.as_deref_mut()?.child_mut(seg),
            _ => None,
        }
    }

    fn put(&mut self, seg: &Seg, value: Self) -> bool {
        match (self, seg) {
            (_, Seg::Wildcard) => false,
            (Dependencies::Fields(map), _) => {
                map.insert(seg.object_key(), value);
                true
            }
            (Dependencies::Items(items), Seg::Index(i)) => {
                let padded = tree::pad_to_index(items, *i);
                if padded {
                    items[*i] = value;
                }
                padded
            }
            (Dependencies::AllFields { values, .. }, _) => {
                let values = values.get_or_insert_with(|| {
                    Box::new(match seg {
                        Seg::Index(_) => Dependencies::new_array(),
                        _ => Dependencies::new_object(),
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
            (Dependencies::Fields(map), _) => map.shift_remove(&seg.object_key()),
            (Dependencies::Items(items), Seg::Index(i)) if *i < items.len() => {
                Some(items.remove(*i))
            }
            (Dependencies::AllFields { values, .. }, _) => values.as_deref_mut()?.take(seg),
            _ => None,
        }
    }

    fn as_array_mut(&mut self) -> Option<&mut Vec<Self>> {
        match self {
            Dependencies::Items(items) => Some(items),
            Dependencies::AllFields { values, .. } => values.as_deref_mut()?.as_array_mut(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_fields_in_order() {
        let deps = Dependencies::fields([
            ("confirm", Dependencies::field(["password"])),
            (
                "items",
                Dependencies::all_fields(["currency"]).with_values(Dependencies::items([
                    Dependencies::Empty,
                    Dependencies::fields([("total", Dependencies::field(["items.*.price"]))]),
                ])),
            ),
        ]);
        let mut seen = Vec::new();
        deps.for_each_declared(|field, list| {
            seen.push((field.to_string(), list.iter().map(Path::to_string).collect::<Vec<_>>()))
        });
        assert_eq!(
            seen,
            vec![
                ("confirm".to_string(), vec!["password".to_string()]),
                ("items".to_string(), vec!["currency".to_string()]),
                ("items.1.total".to_string(), vec!["items.*.price".to_string()]),
            ]
        );
    }

    #[test]
    fn tree_ops_reach_into_all_fields() {
        let mut deps = Dependencies::fields([("items", Dependencies::all_fields(["x"]))]);
        tree::set(&Path::parse("items.1"), Dependencies::field(["y"]), &mut deps);
        assert_eq!(
            tree::get(&Path::parse("items.1"), &deps),
            Some(&Dependencies::field(["y"]))
        );
        tree::prepend(&Path::parse("items"), Dependencies::Empty, &mut deps);
        assert_eq!(
            tree::get(&Path::parse("items.2"), &deps),
            Some(&Dependencies::field(["y"]))
        );
        assert_eq!(
            tree::remove(&Path::parse("items.2"), &mut deps),
            Some(Dependencies::field(["y"]))
        );
    }
}
