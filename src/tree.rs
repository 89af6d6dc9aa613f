//! Path-addressed access to nested trees.
//!
//! The value tree and every shadow tree (touched, dirty, errors, validators,
//! dependencies) implement [`Tree`], so the same primitives edit all of them.
//! The primitives are total: a missing segment, a `null` intermediate or the
//! wrong container kind yields `None` or leaves the tree untouched. Writes
//! never pad an array by more than [`MAX_PADDING`] placeholders; an index
//! further out is treated like any other unreachable path.

use serde_json::{Map, Value};

use crate::{
    error::{FormError, FormResult},
    path::{Path, Seg},
};

/// A node in a nested object/array tree.
pub trait Tree: Sized {
    fn new_object() -> Self;

    fn new_array() -> Self;

    /// Filler used when an array has to grow to reach an index.
    fn placeholder() -> Self;

    fn is_container(&self) -> bool;

    fn child(&self, seg: &Seg) -> Option<&Self>;

    fn child_mut(&mut self, seg: &Seg) -> Option<&mut Self>;

    /// Stores `value` under `seg` in this container. Returns false when this
    /// node cannot hold `seg` (not a container, or a key on an array).
    fn put(&mut self, seg: &Seg, value: Self) -> bool;

    /// Removes the entry under `seg`, splicing arrays.
    fn take(&mut self, seg: &Seg) -> Option<Self>;

    fn as_array_mut(&mut self) -> Option<&mut Vec<Self>>;
}

/// Returns the node at `path`, or `None` if any segment is missing.
pub fn get<'a, T: Tree>(path: &Path, tree: &'a T) -> Option<&'a T> {
    path.iter().try_fold(tree, |node, seg| node.child(seg))
}

/// Like [`get`], but a missing node is a [`FormError::NotFound`].
pub fn get_safe<'a, T: Tree>(path: &Path, tree: &'a T) -> FormResult<&'a T> {
    get(path, tree).ok_or_else(|| FormError::not_found(path.clone()))
}

pub fn get_mut<'a, T: Tree>(path: &Path, tree: &'a mut T) -> Option<&'a mut T> {
    path.iter().try_fold(tree, |node, seg| node.child_mut(seg))
}

/// Assigns `value` at `path`, creating intermediate containers on the way:
/// an array when the following segment is an index, an object otherwise.
///
/// The root path replaces the whole tree. Any other path is a no-op when the
/// root is not a container.
pub fn set<'a, T: Tree>(path: &Path, value: T, tree: &'a mut T) -> &'a mut T {
    if !path.is_root() && !tree.is_container() {
        return tree;
    }
    set_in(tree, path.segments(), value);
    tree
}

fn set_in<T: Tree>(node: &mut T, segments: &[Seg], value: T) {
    let Some((seg, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if rest.is_empty() {
        node.put(seg, value);
        return;
    }

    let needs_container = node.child(seg).is_none_or(|child| !child.is_container());
    if needs_container {
        let fresh = match rest[0] {
            Seg::Index(_) => T::new_array(),
            _ => T::new_object(),
        };
        if !node.put(seg, fresh) {
            return;
        }
    }
    if let Some(child) = node.child_mut(seg) {
        set_in(child, rest, value);
    }
}

/// Pushes `value` onto the array at `path`. No-op unless it is an array.
pub fn append<T: Tree>(path: &Path, value: T, tree: &mut T) {
    if let Some(array) = get_mut(path, tree).and_then(T::as_array_mut) {
        array.push(value);
    }
}

/// Inserts `value` at the front of the array at `path`. No-op unless it is
/// an array.
pub fn prepend<T: Tree>(path: &Path, value: T, tree: &mut T) {
    if let Some(array) = get_mut(path, tree).and_then(T::as_array_mut) {
        array.insert(0, value);
    }
}

/// Deletes the node at `path`, shifting later array elements down by one.
pub fn remove<T: Tree>(path: &Path, tree: &mut T) -> Option<T> {
    let (parent, last) = path.split_last()?;
    get_mut(&parent, tree)?.take(last)
}

/// Exchanges two elements of the array at `path`. No-op when either index is
/// out of range.
pub fn swap<T: Tree>(path: &Path, a: usize, b: usize, tree: &mut T) {
    if let Some(array) = get_mut(path, tree).and_then(T::as_array_mut) {
        if a < array.len() && b < array.len() {
            array.swap(a, b);
        }
    }
}

/// Inserts `value` at `index` of the array at `path`, padding with
/// placeholders when the array is shorter. When no array lives at `path`,
/// `value` is [`set`] at `path.index`, which creates one.
pub fn insert<T: Tree>(path: &Path, index: usize, value: T, tree: &mut T) {
    if let Some(array) = get_mut(path, tree).and_then(T::as_array_mut) {
        if index <= array.len() {
            array.insert(index, value);
        } else if pad_to_index(array, index) {
            array[index] = value;
        }
        return;
    }
    set(&path.child(index), value, tree);
}

/// Drops the entry at `path`. Inside an array the slot is kept and reset to
/// a placeholder so later indices stay put.
pub fn clear<T: Tree>(path: &Path, tree: &mut T) {
    let Some((parent, last)) = path.split_last() else {
        return;
    };
    let Some(node) = get_mut(&parent, tree) else {
        return;
    };
    if last.as_index().is_some() && node.as_array_mut().is_some() {
        if node.child(last).is_some() {
            node.put(last, T::placeholder());
        }
    } else {
        node.take(last);
    }
}

/// Most placeholders a single write may append to reach its index.
pub const MAX_PADDING: usize = 1024;

pub(crate) fn pad_array<T: Tree>(array: &mut Vec<T>, len: usize) {
    if array.len() < len {
        array.resize_with(len, T::placeholder);
    }
}

/// Grows `array` with placeholders until `index` is in range. Returns false,
/// leaving the array alone, when that takes more than [`MAX_PADDING`].
pub(crate) fn pad_to_index<T: Tree>(array: &mut Vec<T>, index: usize) -> bool {
    if index.saturating_sub(array.len()) > MAX_PADDING {
        return false;
    }
    if index >= array.len() {
        array.resize_with(index + 1, T::placeholder);
    }
    true
}

impl Tree for Value {
    fn new_object() -> Self {
        Value::Object(Map::new())
    }

    fn new_array() -> Self {
        Value::Array(Vec::new())
    }

    fn placeholder() -> Self {
        Value::Null
    }

    fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    fn child(&self, seg: &Seg) -> Option<&Self> {
        match (self, seg) {
            (Value::Object(map), _) if !seg.is_wildcard() => map.get(&seg.object_key()),
            (Value::Array(items), Seg::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    fn child_mut(&mut self, seg: &Seg) -> Option<&mut Self> {
        match (self, seg) {
            (Value::Object(map), _) if !seg.is_wildcard() => map.get_mut(&seg.object_key()),
            (Value::Array(items), Seg::Index(i)) => items.get_mut(*i),
            _ => None,
        }
    }

    fn put(&mut self, seg: &Seg, value: Self) -> bool {
        match (self, seg) {
            (_, Seg::Wildcard) => false,
            (Value::Object(map), _) => {
                map.insert(seg.object_key(), value);
                true
            }
            (Value::Array(items), Seg::Index(i)) => {
                let padded = pad_to_index(items, *i);
                if padded {
                    items[*i] = value;
                }
                padded
            }
            _ => false,
        }
    }

    fn take(&mut self, seg: &Seg) -> Option<Self> {
        match (self, seg) {
            (_, Seg::Wildcard) => None,
            (Value::Object(map), _) => map.shift_remove(&seg.object_key()),
            (Value::Array(items), Seg::Index(i)) if *i < items.len() => Some(items.remove(*i)),
            _ => None,
        }
    }

    fn as_array_mut(&mut self) -> Option<&mut Vec<Self>> {
        Value::as_array_mut(self)
    }
}
