//! Structural edits on an array field.
//!
//! Every edit is applied to the values, the defaults and all shadow trees in
//! one batch, so the element at index `i` has its flags, error, validator and
//! dependencies at index `i` of the matching tree before and after the edit.

use floem_form_reactive::batch;
use serde_json::Value;
use tracing::debug;

use crate::{
    deep,
    dependencies::Dependencies,
    error::FormResult,
    form::Form,
    path::Path,
    tree::{self, Tree},
    validator::Validators,
};

#[derive(Clone, Debug, Default)]
pub struct FieldArrayOptions {
    /// Dependencies declared by the new element.
    pub deps: Option<Dependencies>,
    /// Validator for the new element only.
    pub validator: Option<Validators>,
    /// Validate the new element right away. Needs `validator`.
    pub validate: bool,
}

/// Handle returned by [`Form::use_field_array`].
#[derive(Clone, Debug)]
pub struct FieldArray {
    form: Form,
    name: Path,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum End {
    Front,
    Back,
}

impl FieldArray {
    pub(crate) fn new(form: Form, name: Path) -> Self {
        Self { form, name }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.form.inner.values.with(|values| {
            tree::get(&self.name, values)
                .and_then(Value::as_array)
                .map_or(0, Vec::len)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes `value` as a new element, marked untouched and dirty.
    pub async fn append(&self, value: Value, opts: FieldArrayOptions) -> FormResult<()> {
        self.insert(End::Back, value, opts).await
    }

    /// Inserts `value` at index 0, shifting every existing element and its
    /// shadow entries up by one.
    pub async fn prepend(&self, value: Value, opts: FieldArrayOptions) -> FormResult<()> {
        self.insert(End::Front, value, opts).await
    }

    async fn insert(&self, end: End, value: Value, opts: FieldArrayOptions) -> FormResult<()> {
        let index = match end {
            End::Front => 0,
            End::Back => self.len(),
        };
        let FieldArrayOptions {
            deps,
            validator,
            validate,
        } = opts;
        let validate = validate && validator.is_some();
        let inner = &self.form.inner;
        let name = &self.name;

        if end == End::Front {
            self.form.invalidate_under(name);
        }
        batch(|| {
            let untouched = deep::assign(&Value::Bool(false), &value);
            let dirty = deep::assign(&Value::Bool(true), &value);
            {
                let mut defaults = inner.defaults.borrow_mut();
                tree::insert(name, index, value.clone(), &mut defaults.values);
                shift_or_insert(name, index, end, validator.clone(), &mut defaults.validators);
                shift_or_insert(name, index, end, deps.clone(), &mut defaults.dependencies);
            }
            inner.values.update(|values| match end {
                End::Front => tree::prepend(name, value, values),
                End::Back => tree::append(name, value, values),
            });
            inner.touched.update(|touched| tree::insert(name, index, untouched, touched));
            inner.dirty.update(|flags| tree::insert(name, index, dirty, flags));
            inner.errors.update(|errors| {
                shift_or_insert(name, index, end, None, errors);
            });
            inner.validators.update(|validators| {
                shift_or_insert(name, index, end, validator, validators);
            });
            inner.dependencies.update(|tracked| shift_or_insert(name, index, end, deps, tracked));
            self.form.recompile_triggers();
            self.form.refresh_state();
        });
        debug!(field = %name, index, ?end, "inserted array element");

        if validate {
            self.form.validate_field(name.child(index)).await?;
        }
        Ok(())
    }

    /// Removes the element at `index` from every tree. Later elements move
    /// down by one. Returns the removed value.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let inner = &self.form.inner;
        let path = self.name.child(index);
        self.form.invalidate_under(&self.name);
        let removed = batch(|| {
            {
                let mut defaults = inner.defaults.borrow_mut();
                tree::remove(&path, &mut defaults.values);
                tree::remove(&path, &mut defaults.validators);
                tree::remove(&path, &mut defaults.dependencies);
            }
            let removed = inner.values.try_update(|values| tree::remove(&path, values));
            for shadow in [&inner.touched, &inner.dirty, &inner.errors] {
                shadow.update(|shadow| {
                    tree::remove(&path, shadow);
                });
            }
            inner.validators.update(|validators| {
                tree::remove(&path, validators);
            });
            inner.dependencies.update(|deps| {
                tree::remove(&path, deps);
            });
            self.form.recompile_triggers();
            self.form.refresh_state();
            removed
        });
        debug!(field = %self.name, index, found = removed.is_some(), "removed array element");
        removed
    }

    /// Exchanges two elements across every tree. Does nothing when either
    /// index has no touched entry.
    pub fn swap(&self, from: usize, to: usize) {
        let inner = &self.form.inner;
        let name = &self.name;
        let in_range = inner.touched.with(|touched| {
            tree::get(&name.child(from), touched).is_some()
                && tree::get(&name.child(to), touched).is_some()
        });
        if !in_range {
            return;
        }
        self.form.invalidate_under(name);
        batch(|| {
            {
                let mut defaults = inner.defaults.borrow_mut();
                swap_padded(name, from, to, &mut defaults.values);
                swap_padded(name, from, to, &mut defaults.validators);
                swap_padded(name, from, to, &mut defaults.dependencies);
            }
            for cell in [&inner.values, &inner.touched, &inner.dirty, &inner.errors] {
                cell.update(|value| swap_padded(name, from, to, value));
            }
            inner.validators.update(|validators| swap_padded(name, from, to, validators));
            inner.dependencies.update(|deps| swap_padded(name, from, to, deps));
            self.form.recompile_triggers();
            self.form.refresh_state();
        });
        debug!(field = %name, from, to, "swapped array elements");
    }
}

/// Puts `entry` at `index`, or, without an entry, keeps an existing array
/// aligned with the values by shifting it when inserting at the front.
fn shift_or_insert<T: Tree>(name: &Path, index: usize, end: End, entry: Option<T>, target: &mut T) {
    match (entry, end) {
        (Some(entry), _) => tree::insert(name, index, entry, target),
        (None, End::Front) => tree::prepend(name, T::placeholder(), target),
        (None, End::Back) => {}
    }
}

/// Swaps two elements of the array at `name`, padding it first when it is
/// shorter than the values array.
fn swap_padded<T: Tree>(name: &Path, a: usize, b: usize, target: &mut T) {
    if let Some(array) = tree::get_mut(name, target).and_then(T::as_array_mut) {
        if tree::pad_to_index(array, a.max(b)) {
            array.swap(a, b);
        }
    }
}
