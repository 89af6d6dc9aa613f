//! The form handle.
//!
//! A [`Form`] owns the value tree and its shadow trees, each in its own
//! [`Observable`] so a view can subscribe to exactly the part it renders.
//! Every mutation goes through a method here (or on [`FieldArray`]) so that
//! touched/dirty/error bookkeeping and the aggregate [`FormState`] stay in
//! step with the values.
//!
//! Validation is async. The form only suspends while validators run; every
//! tree write happens synchronously before or after that point. Each
//! validation pass takes a generation number per validated path and its
//! results are only written if no newer pass for the same path started in
//! the meantime.

use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    rc::Rc,
};

use floem_form_reactive::{Observable, batch};
use futures::{FutureExt, future::LocalBoxFuture};
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::{
    deep::{self, AssignUsing, MergeOptions},
    dependencies::Dependencies,
    error::{FormError, FormResult, value_type_name},
    event::{FieldAction, FieldEvent},
    field_array::FieldArray,
    path::Path,
    state::{FormState, ValidateOn},
    tree::{self, Tree},
    triggers::{Triggers, create_triggers, find_triggers, get_triggers},
    validator::{self, Validators, get_validators, group_results, run_validators, write_errors},
};

type ResolverFn = dyn Fn(Value) -> LocalBoxFuture<'static, Value>;

/// Schema-mode validation: maps the whole value tree to a partial error
/// tree. Paths missing from the result are valid.
#[derive(Clone)]
pub struct Resolver(Rc<ResolverFn>);

impl Resolver {
    pub fn new(f: impl Fn(&Value) -> Value + 'static) -> Self {
        Self(Rc::new(move |values| {
            let errors = f(&values);
            async move { errors }.boxed_local()
        }))
    }

    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + 'static,
        Fut: Future<Output = Value> + 'static,
    {
        Self(Rc::new(move |values| f(values).boxed_local()))
    }

    pub fn call(&self, values: Value) -> LocalBoxFuture<'static, Value> {
        (self.0)(values)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resolver({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Everything needed to build a [`Form`].
#[derive(Clone, Debug, Default)]
pub struct FormConfig {
    initial_values: Value,
    validators: Validators,
    dependencies: Dependencies,
    validate_on: ValidateOn,
    resolver: Option<Resolver>,
    initial_touched: Option<Value>,
    initial_errors: Option<Value>,
}

impl FormConfig {
    pub fn new(initial_values: Value) -> Self {
        Self {
            initial_values,
            ..Self::default()
        }
    }

    pub fn validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }

    pub fn dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn validate_on(mut self, validate_on: ValidateOn) -> Self {
        self.validate_on = validate_on;
        self
    }

    /// Switches the form to schema mode. The validator tree is ignored.
    pub fn resolver(mut self, resolver: Resolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Touched flags to start from. Only paths that exist in the initial
    /// values are taken.
    pub fn initial_touched(mut self, touched: Value) -> Self {
        self.initial_touched = Some(touched);
        self
    }

    /// Errors to start from, as if a validation pass had produced them.
    pub fn initial_errors(mut self, errors: Value) -> Self {
        self.initial_errors = Some(errors);
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResetFormOptions {
    /// New values. They also become the new defaults.
    pub values: Option<Value>,
    /// Reset to the values the form was created with instead of the current
    /// defaults.
    pub use_initial: bool,
    pub keep_touched: bool,
    pub keep_dirty: bool,
    pub keep_errors: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ResetFieldOptions {
    /// New value for the field. It also becomes the field's default.
    pub value: Option<Value>,
    /// Validate the field after resetting it. Cannot be combined with
    /// `keep_error`.
    pub validate: bool,
    pub keep_error: bool,
    pub keep_touched: bool,
    pub keep_dirty: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SetFieldOptions {
    pub validate: bool,
    pub touch: bool,
}

#[derive(Clone, Debug, Default)]
pub struct AddFieldOptions {
    pub validator: Option<Validators>,
    pub dependencies: Option<Dependencies>,
    pub validate: bool,
}

/// The baseline resets fall back to. Field-array edits move it along.
#[derive(Clone, Debug, Default)]
pub(crate) struct Defaults {
    pub(crate) values: Value,
    pub(crate) validators: Validators,
    pub(crate) dependencies: Dependencies,
}

pub(crate) struct FormInner {
    pub(crate) values: Observable<Value>,
    pub(crate) touched: Observable<Value>,
    pub(crate) dirty: Observable<Value>,
    pub(crate) errors: Observable<Value>,
    pub(crate) validators: Observable<Validators>,
    pub(crate) dependencies: Observable<Dependencies>,
    state: Observable<FormState>,
    latest_event: Observable<Option<FieldEvent>>,
    initial_values: Value,
    pub(crate) defaults: RefCell<Defaults>,
    triggers: RefCell<Triggers>,
    generations: RefCell<FxHashMap<Path, u64>>,
    next_generation: Cell<u64>,
    validations: Cell<u32>,
    submits: Cell<u32>,
    pub(crate) validate_on: ValidateOn,
    resolver: Option<Resolver>,
}

/// Handle to a form. Clones share the same state.
#[derive(Clone)]
pub struct Form {
    pub(crate) inner: Rc<FormInner>,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("values", &*self.inner.values.borrow())
            .field("state", &self.inner.state.get())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
enum Gate {
    Validating,
    Submitting,
}

/// Keeps `is_validating` or `is_submitting` raised until dropped, whichever
/// way the guarded work ends.
struct InFlight {
    form: Form,
    gate: Gate,
}

impl InFlight {
    fn enter(form: &Form, gate: Gate) -> Self {
        let counter = form.counter(gate);
        counter.set(counter.get() + 1);
        form.refresh_state();
        Self {
            form: form.clone(),
            gate,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let counter = self.form.counter(self.gate);
        counter.set(counter.get().saturating_sub(1));
        self.form.refresh_state();
    }
}

/// Generation numbers handed out to one validation pass.
type Tickets = FxHashMap<Path, u64>;

fn object_root<T: Tree>(tree: T, is_empty: bool) -> T {
    if is_empty { T::new_object() } else { tree }
}

fn is_true(value: &Value) -> bool {
    value.as_bool() == Some(true)
}

impl Form {
    pub fn new(config: FormConfig) -> Self {
        let FormConfig {
            initial_values,
            validators,
            dependencies,
            validate_on,
            resolver,
            initial_touched,
            initial_errors,
        } = config;

        let untouched = deep::assign(&Value::Bool(false), &initial_values);
        let touched = match initial_touched {
            Some(overrides) => deep::assign_using(&untouched, &overrides, &AssignUsing::default()),
            None => untouched.clone(),
        };
        let errors = initial_errors.unwrap_or_else(|| Value::Object(Map::new()));
        let validators = {
            let empty = validators.is_empty();
            object_root(validators, empty)
        };
        let dependencies = {
            let empty = dependencies.is_empty();
            object_root(dependencies, empty)
        };
        let triggers = create_triggers(&dependencies, &initial_values);

        let inner = FormInner {
            values: Observable::new(initial_values.clone()),
            touched: Observable::new(touched),
            dirty: Observable::new(untouched),
            errors: Observable::new(errors),
            validators: Observable::new(validators.clone()),
            dependencies: Observable::new(dependencies.clone()),
            state: Observable::new(FormState::default()),
            latest_event: Observable::new(None),
            defaults: RefCell::new(Defaults {
                values: initial_values.clone(),
                validators,
                dependencies,
            }),
            initial_values,
            triggers: RefCell::new(triggers),
            generations: RefCell::new(FxHashMap::default()),
            next_generation: Cell::new(0),
            validations: Cell::new(0),
            submits: Cell::new(0),
            validate_on,
            resolver,
        };
        let form = Self {
            inner: Rc::new(inner),
        };
        form.refresh_state();
        form
    }

    pub fn values(&self) -> Observable<Value> {
        self.inner.values.clone()
    }

    pub fn touched(&self) -> Observable<Value> {
        self.inner.touched.clone()
    }

    pub fn dirty(&self) -> Observable<Value> {
        self.inner.dirty.clone()
    }

    /// The error tree. A missing entry means the field was never validated,
    /// `false` that it passed, a string is the error message.
    pub fn errors(&self) -> Observable<Value> {
        self.inner.errors.clone()
    }

    pub fn validators(&self) -> Observable<Validators> {
        self.inner.validators.clone()
    }

    pub fn dependencies(&self) -> Observable<Dependencies> {
        self.inner.dependencies.clone()
    }

    pub fn state(&self) -> Observable<FormState> {
        self.inner.state.clone()
    }

    pub fn latest_field_event(&self) -> Observable<Option<FieldEvent>> {
        self.inner.latest_event.clone()
    }

    pub fn initial_values(&self) -> &Value {
        &self.inner.initial_values
    }

    pub fn default_values(&self) -> Value {
        self.inner.defaults.borrow().values.clone()
    }

    /// The value at `path`, or [`FormError::NotFound`].
    pub fn value(&self, path: impl Into<Path>) -> FormResult<Value> {
        let path = path.into();
        self.inner
            .values
            .with(|values| tree::get_safe(&path, values).cloned())
    }

    pub fn error(&self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        self.inner.errors.with(|errors| tree::get(&path, errors).cloned())
    }

    /// The fields revalidated when `path` changes.
    pub fn triggers_for(&self, path: impl Into<Path>) -> Vec<Path> {
        get_triggers(&path.into(), &self.inner.triggers.borrow())
    }

    pub fn use_field_array(&self, path: impl Into<Path>) -> FormResult<FieldArray> {
        let path = path.into();
        let found = self
            .inner
            .values
            .with(|values| tree::get(&path, values).map(value_type_name));
        match found {
            Some("array") => Ok(FieldArray::new(self.clone(), path)),
            found => Err(FormError::NotAnArray {
                path,
                found: found.unwrap_or("nothing"),
            }),
        }
    }

    /// Sets a field from user input and validates it, with its triggers, when
    /// the form validates on change.
    pub async fn handle_change(&self, path: impl Into<Path>, value: Value) -> FormResult<()> {
        let path = path.into();
        self.apply_change(&path, value, false);
        if self.inner.validate_on.contains(ValidateOn::CHANGE) {
            self.validate_field(path).await?;
        }
        Ok(())
    }

    /// Marks a field touched. Blurring a container touches everything in it.
    pub async fn handle_blur(&self, path: impl Into<Path>) -> FormResult<()> {
        let path = path.into();
        self.emit(FieldEvent::before(path.clone(), FieldAction::Blur));
        self.touch(&path);
        self.refresh_state();
        self.emit(FieldEvent::after(path.clone(), FieldAction::Blur));
        if self.inner.validate_on.contains(ValidateOn::BLUR) {
            self.validate_field(path).await?;
        }
        Ok(())
    }

    pub async fn handle_focus(&self, path: impl Into<Path>) -> FormResult<()> {
        let path = path.into();
        self.emit(FieldEvent::before(path.clone(), FieldAction::Focus));
        self.emit(FieldEvent::after(path.clone(), FieldAction::Focus));
        if self.inner.validate_on.contains(ValidateOn::FOCUS) {
            self.validate_field(path).await?;
        }
        Ok(())
    }

    /// Programmatic counterpart of [`Form::handle_change`].
    pub async fn set_field(
        &self,
        path: impl Into<Path>,
        value: Value,
        opts: SetFieldOptions,
    ) -> FormResult<()> {
        let path = path.into();
        self.apply_change(&path, value, opts.touch);
        if opts.validate {
            self.validate_field(path).await?;
        }
        Ok(())
    }

    fn apply_change(&self, path: &Path, value: Value, touch: bool) {
        self.emit(FieldEvent::before(path.clone(), FieldAction::Change));
        let reshaped = value.is_container() || path.iter().any(|seg| seg.as_index().is_some());
        if value.is_container() {
            self.invalidate_under(path);
        }
        batch(|| {
            self.inner.values.update(|values| {
                tree::set(path, value, values);
            });
            self.fit_shadows_at(path);
            self.refresh_dirty_at(path);
            if touch {
                self.touch(path);
            }
            if reshaped {
                self.recompile_triggers();
            }
            self.refresh_state();
        });
        self.emit(FieldEvent::after(path.clone(), FieldAction::Change));
    }

    /// Adds a field that is not part of the values yet. The value becomes the
    /// field's default, so the new field starts out clean.
    pub async fn add_field(
        &self,
        path: impl Into<Path>,
        value: Value,
        opts: AddFieldOptions,
    ) -> FormResult<()> {
        let path = path.into();
        let AddFieldOptions {
            validator,
            dependencies,
            validate,
        } = opts;
        let has_dependencies = dependencies.is_some();
        self.emit(FieldEvent::before(path.clone(), FieldAction::Change));
        batch(|| {
            let clean = deep::assign(&Value::Bool(false), &value);
            self.inner.touched.update(|touched| {
                tree::set(&path, clean.clone(), touched);
            });
            self.inner.dirty.update(|dirty| {
                tree::set(&path, clean, dirty);
            });
            {
                let mut defaults = self.inner.defaults.borrow_mut();
                tree::set(&path, value.clone(), &mut defaults.values);
                if let Some(validator) = &validator {
                    tree::set(&path, validator.clone(), &mut defaults.validators);
                }
                if let Some(dependencies) = &dependencies {
                    tree::set(&path, dependencies.clone(), &mut defaults.dependencies);
                }
            }
            self.inner.values.update(|values| {
                tree::set(&path, value, values);
            });
            if let Some(validator) = validator {
                self.inner.validators.update(|validators| {
                    tree::set(&path, validator, validators);
                });
            }
            if let Some(dependencies) = dependencies {
                self.inner.dependencies.update(|deps| {
                    tree::set(&path, dependencies, deps);
                });
            }
            self.recompile_triggers();
            self.refresh_state();
        });
        debug!(%path, has_dependencies, "added field");
        self.emit(FieldEvent::after(path.clone(), FieldAction::Change));
        if validate {
            self.validate_field(path).await?;
        }
        Ok(())
    }

    /// Removes a field from every tree, defaults included. Returns the
    /// removed value.
    pub fn remove_field(&self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        self.invalidate_under(&path);
        let removed = batch(|| {
            let removed = self
                .inner
                .values
                .try_update(|values| tree::remove(&path, values));
            self.inner.touched.update(|touched| {
                tree::remove(&path, touched);
            });
            self.inner.dirty.update(|dirty| {
                tree::remove(&path, dirty);
            });
            self.inner.errors.update(|errors| {
                tree::remove(&path, errors);
            });
            self.inner.validators.update(|validators| {
                tree::remove(&path, validators);
            });
            self.inner.dependencies.update(|deps| {
                tree::remove(&path, deps);
            });
            {
                let mut defaults = self.inner.defaults.borrow_mut();
                tree::remove(&path, &mut defaults.values);
                tree::remove(&path, &mut defaults.validators);
                tree::remove(&path, &mut defaults.dependencies);
            }
            self.recompile_triggers();
            self.refresh_state();
            removed
        });
        debug!(%path, found = removed.is_some(), "removed field");
        removed
    }

    /// Replaces the validator tree. The new tree is also what resets restore.
    pub fn set_validators(&self, validators: Validators) {
        let empty = validators.is_empty();
        let validators = object_root(validators, empty);
        self.inner.defaults.borrow_mut().validators = validators.clone();
        self.inner.validators.set(validators);
    }

    /// Replaces the dependency tree and recompiles the triggers.
    pub fn set_dependencies(&self, dependencies: Dependencies) {
        let empty = dependencies.is_empty();
        let dependencies = object_root(dependencies, empty);
        self.inner.defaults.borrow_mut().dependencies = dependencies.clone();
        self.inner.dependencies.set(dependencies);
        self.recompile_triggers();
    }

    /// Validates `path` and every field that depends on it.
    pub async fn validate_field(&self, path: impl Into<Path>) -> FormResult<()> {
        let path = path.into();
        let mut targets = vec![path.clone()];
        targets.extend(get_triggers(&path, &self.inner.triggers.borrow()));
        self.run_pass(targets).await
    }

    /// Validates the whole form and reports whether it is free of errors.
    ///
    /// Every field ends up with an entry in the error tree. A validator tree
    /// that does not fit the values is returned as
    /// [`FormError::ValidatorShapeMismatch`].
    pub async fn validate_form(&self) -> FormResult<bool> {
        let _validating = InFlight::enter(self, Gate::Validating);
        let root = Path::root();
        self.emit(FieldEvent::before(root.clone(), FieldAction::Validate));

        let outcome = match self.inner.resolver.clone() {
            Some(resolver) => {
                let tickets = self.issue_generations([&root]);
                let computed = self.schema_errors(&resolver).await;
                computed.map(|computed| {
                    if self.is_current(&root, &tickets) {
                        self.inner.errors.set(computed);
                    }
                })
            }
            None => self.validate_all_schemaless().await,
        };
        self.refresh_state();
        self.emit(FieldEvent::after(root, FieldAction::Validate));
        outcome?;
        Ok(!self.inner.errors.with(validator::has_errors))
    }

    async fn validate_all_schemaless(&self) -> FormResult<()> {
        let resolved = {
            let validators = self.inner.validators.borrow();
            let values = self.inner.values.borrow();
            get_validators(&Path::root(), &validators, &values)?
        };
        let tickets = self.issue_generations(resolved.iter().map(|(path, _)| path));
        debug!(validators = resolved.len(), "validating form");
        let snapshot = Rc::new(self.inner.values.get());
        let results = run_validators(resolved, snapshot).await;
        let fresh = self.keep_current(group_results(results), &tickets);

        let base = self
            .inner
            .values
            .with(|values| deep::assign(&Value::Bool(false), values));
        self.inner.errors.try_update(|errors| -> FormResult<()> {
            deep::merge_right_deep(errors, &base, MergeOptions::default().only_new_keys(true))?;
            write_errors(errors, fresh);
            Ok(())
        })
    }

    async fn run_pass(&self, targets: Vec<Path>) -> FormResult<()> {
        let _validating = InFlight::enter(self, Gate::Validating);
        for target in &targets {
            self.emit(FieldEvent::before(target.clone(), FieldAction::Validate));
        }
        let outcome = match self.inner.resolver.clone() {
            Some(resolver) => self.schema_pass(&resolver, &targets).await,
            None => self.schemaless_pass(&targets).await,
        };
        self.refresh_state();
        for target in targets {
            self.emit(FieldEvent::after(target, FieldAction::Validate));
        }
        outcome
    }

    async fn schemaless_pass(&self, targets: &[Path]) -> FormResult<()> {
        let mut resolved = Vec::new();
        let mut first_error = None;
        {
            let validators = self.inner.validators.borrow();
            let values = self.inner.values.borrow();
            for target in targets {
                match get_validators(target, &validators, &values) {
                    Ok(list) => resolved.extend(list),
                    Err(err) => {
                        debug!(%target, %err, "skipping field with unresolvable validators");
                        first_error.get_or_insert(err);
                    }
                }
            }
        }
        let tickets = self.issue_generations(resolved.iter().map(|(path, _)| path));
        debug!(
            targets = targets.len(),
            validators = resolved.len(),
            "validation pass"
        );
        let snapshot = Rc::new(self.inner.values.get());
        let results = run_validators(resolved, snapshot).await;
        let fresh = self.keep_current(group_results(results), &tickets);
        self.inner.errors.update(|errors| write_errors(errors, fresh));
        first_error.map_or(Ok(()), Err)
    }

    async fn schema_pass(&self, resolver: &Resolver, targets: &[Path]) -> FormResult<()> {
        let tickets = self.issue_generations(targets);
        let computed = self.schema_errors(resolver).await?;
        self.inner.errors.update(|errors| {
            for target in targets {
                if !self.is_current(target, &tickets) {
                    trace!(%target, "dropping stale schema result");
                    continue;
                }
                let result = tree::get(target, &computed)
                    .cloned()
                    .unwrap_or(Value::Bool(false));
                tree::set(target, result, errors);
            }
        });
        Ok(())
    }

    /// Runs the schema resolver and widens its partial result to a full
    /// error tree.
    async fn schema_errors(&self, resolver: &Resolver) -> FormResult<Value> {
        let snapshot = self.inner.values.get();
        let mut errors = deep::assign(&Value::Bool(false), &snapshot);
        let partial = resolver.call(snapshot).await;
        deep::merge_right_deep(&mut errors, &partial, MergeOptions::default())?;
        Ok(errors)
    }

    /// Validates the form when configured to, then hands the values to
    /// `on_valid`. See [`Form::submit_form_with`].
    pub async fn submit_form<E, F, Fut>(&self, on_valid: F) -> Result<(), E>
    where
        E: From<FormError>,
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        self.submit_form_with(on_valid, |_errors: Value| async { Ok::<(), E>(()) })
            .await
    }

    /// Submits the form.
    ///
    /// A valid form calls `on_valid` with the values. An invalid one has
    /// every field marked touched and calls `on_invalid` with the error tree.
    /// Errors returned by either callback are passed through; `is_submitting`
    /// is lowered in every case.
    pub async fn submit_form_with<E, F, FFut, G, GFut>(
        &self,
        on_valid: F,
        on_invalid: G,
    ) -> Result<(), E>
    where
        E: From<FormError>,
        F: FnOnce(Value) -> FFut,
        FFut: Future<Output = Result<(), E>>,
        G: FnOnce(Value) -> GFut,
        GFut: Future<Output = Result<(), E>>,
    {
        let _submitting = InFlight::enter(self, Gate::Submitting);
        self.inner.state.update(|state| state.submit_count += 1);

        let valid = if self.inner.validate_on.contains(ValidateOn::SUBMIT) {
            match self.validate_form().await {
                Ok(valid) => valid,
                Err(err @ FormError::ValidatorShapeMismatch { .. }) => {
                    warn!(%err, "validator tree does not fit the values, form is invalid");
                    false
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            !self.inner.errors.with(validator::has_errors)
        };
        debug!(valid, "submitting form");

        if valid {
            on_valid(self.inner.values.get()).await
        } else {
            self.touch(&Path::root());
            self.refresh_state();
            on_invalid(self.inner.errors.get()).await
        }
    }

    /// Restores the whole form to its defaults, or to `opts.values`.
    pub fn reset_form(&self, opts: ResetFormOptions) {
        let root = Path::root();
        self.emit(FieldEvent::before(root.clone(), FieldAction::Reset));
        self.invalidate_under(&root);
        let baseline = {
            let mut defaults = self.inner.defaults.borrow_mut();
            if let Some(values) = &opts.values {
                defaults.values = values.clone();
            } else if opts.use_initial {
                defaults.values = self.inner.initial_values.clone();
            }
            defaults.clone()
        };
        batch(|| {
            let clean = deep::assign(&Value::Bool(false), &baseline.values);
            self.inner.values.set(baseline.values);
            if !opts.keep_touched {
                self.inner.touched.set(clean.clone());
            }
            if !opts.keep_dirty {
                self.inner.dirty.set(clean);
            }
            if !opts.keep_errors {
                self.inner.errors.set(Value::Object(Map::new()));
            }
            self.inner.validators.set(baseline.validators);
            self.inner.dependencies.set(baseline.dependencies);
            self.recompile_triggers();
            self.inner.state.update(|state| state.submit_count = 0);
            self.refresh_state();
        });
        debug!(use_initial = opts.use_initial, "reset form");
        self.emit(FieldEvent::after(root, FieldAction::Reset));
    }

    /// Restores one field to its default value, validator and flags, and
    /// forgets its validation result and those of the fields depending on it.
    pub async fn reset_field(&self, path: impl Into<Path>, opts: ResetFieldOptions) -> FormResult<()> {
        let path = path.into();
        if opts.validate && opts.keep_error {
            return Err(FormError::config(
                "reset_field: `validate` and `keep_error` cannot be combined",
            ));
        }
        self.emit(FieldEvent::before(path.clone(), FieldAction::Reset));
        let (value, validator) = {
            let mut defaults = self.inner.defaults.borrow_mut();
            if let Some(value) = &opts.value {
                tree::set(&path, value.clone(), &mut defaults.values);
            }
            (
                tree::get(&path, &defaults.values).cloned().unwrap_or(Value::Null),
                tree::get(&path, &defaults.validators).cloned(),
            )
        };
        let dependents = self
            .inner
            .dependencies
            .with(|deps| find_triggers(&path, deps));
        self.invalidate_under(&path);

        let reshaped = value.is_container() || path.iter().any(|seg| seg.as_index().is_some());
        batch(|| {
            let clean = deep::assign(&Value::Bool(false), &value);
            self.inner.values.update(|values| {
                tree::set(&path, value, values);
            });
            self.fit_shadows_at(&path);
            if !opts.keep_touched {
                self.inner.touched.update(|touched| {
                    tree::set(&path, clean.clone(), touched);
                });
            }
            if !opts.keep_dirty {
                self.inner.dirty.update(|dirty| {
                    tree::set(&path, clean, dirty);
                });
            }
            self.inner.validators.update(|validators| match validator {
                Some(validator) => {
                    tree::set(&path, validator, validators);
                }
                None => tree::clear(&path, validators),
            });
            if !opts.keep_error {
                self.inner.errors.update(|errors| {
                    tree::clear(&path, errors);
                    for dependent in &dependents {
                        tree::clear(dependent, errors);
                    }
                });
            }
            if reshaped {
                self.recompile_triggers();
            }
            self.refresh_state();
        });
        debug!(%path, dependents = dependents.len(), "reset field");
        self.emit(FieldEvent::after(path.clone(), FieldAction::Reset));

        if opts.validate {
            self.validate_field(path).await?;
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event: FieldEvent) {
        self.inner.latest_event.set(Some(event));
    }

    fn counter(&self, gate: Gate) -> &Cell<u32> {
        match gate {
            Gate::Validating => &self.inner.validations,
            Gate::Submitting => &self.inner.submits,
        }
    }

    /// Marks `path` and everything below it touched.
    fn touch(&self, path: &Path) {
        let touched = self.inner.values.with(|values| {
            tree::get(path, values).map(|node| deep::assign(&Value::Bool(true), node))
        });
        if let Some(touched) = touched {
            self.inner.touched.update(|flags| {
                tree::set(path, touched, flags);
            });
        }
    }

    /// Fits the touched, dirty and error entries at `path` to the value now
    /// stored there. Flags and results of fields that still exist are kept,
    /// new fields start out untouched and clean with no result.
    fn fit_shadows_at(&self, path: &Path) {
        let Some(shape) = self
            .inner
            .values
            .with(|values| tree::get(path, values).cloned())
        else {
            return;
        };
        let clean = deep::assign(&Value::Bool(false), &shape);
        for shadow in [&self.inner.touched, &self.inner.dirty] {
            let fitted = shadow.with(|flags| match tree::get(path, flags) {
                Some(old) => deep::assign_using(&clean, old, &AssignUsing::default()),
                None => clean.clone(),
            });
            if shadow.with(|flags| tree::get(path, flags) != Some(&fitted)) {
                shadow.update(|flags| {
                    tree::set(path, fitted, flags);
                });
            }
        }

        let fitted = self.inner.errors.with(|errors| {
            let old = tree::get(path, errors)?;
            let kept = deep::retain_shape(old, &shape);
            (kept.as_ref() != Some(old)).then_some(kept)
        });
        match fitted {
            Some(Some(kept)) => self.inner.errors.update(|errors| {
                tree::set(path, kept, errors);
            }),
            Some(None) => self.inner.errors.update(|errors| {
                tree::remove(path, errors);
            }),
            None => {}
        }
    }

    /// Recomputes the dirty flags at `path` against the defaults.
    pub(crate) fn refresh_dirty_at(&self, path: &Path) {
        let dirty = self.inner.values.with(|values| -> Option<Value> {
            let current = tree::get(path, values)?;
            let defaults = self.inner.defaults.borrow();
            Some(deep::diff_dirty(current, tree::get(path, &defaults.values)))
        });
        if let Some(dirty) = dirty {
            self.inner.dirty.update(|flags| {
                tree::set(path, dirty, flags);
            });
        }
    }

    pub(crate) fn recompile_triggers(&self) {
        let triggers = self.inner.dependencies.with(|deps| {
            self.inner
                .values
                .with(|values| create_triggers(deps, values))
        });
        *self.inner.triggers.borrow_mut() = triggers;
    }

    /// Recomputes the aggregate flags, notifying only when they changed.
    pub(crate) fn refresh_state(&self) {
        let inner = &self.inner;
        let has_errors = inner.errors.with(validator::has_errors);
        let is_dirty = inner.dirty.with(|dirty| deep::some_deep(&is_true, dirty));
        let is_touched = inner
            .touched
            .with(|touched| deep::some_deep(&is_true, touched));
        let current = inner.state.get();
        let next = FormState {
            is_submitting: inner.submits.get() > 0,
            is_validating: inner.validations.get() > 0,
            is_valid: !has_errors,
            has_errors,
            is_dirty,
            is_touched,
            submit_count: current.submit_count,
        };
        if next != current {
            inner.state.set(next);
        }
    }

    fn issue_generations<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> Tickets {
        let mut generations = self.inner.generations.borrow_mut();
        let mut tickets = Tickets::default();
        for path in paths {
            if tickets.contains_key(path) {
                continue;
            }
            let generation = self.inner.next_generation.get() + 1;
            self.inner.next_generation.set(generation);
            generations.insert(path.clone(), generation);
            tickets.insert(path.clone(), generation);
        }
        tickets
    }

    fn is_current(&self, path: &Path, tickets: &Tickets) -> bool {
        let generations = self.inner.generations.borrow();
        tickets.get(path).is_some_and(|ticket| generations.get(path) == Some(ticket))
    }

    fn keep_current(
        &self,
        grouped: Vec<(Path, Option<String>)>,
        tickets: &Tickets,
    ) -> Vec<(Path, Option<String>)> {
        grouped
            .into_iter()
            .filter(|(path, _)| {
                let current = self.is_current(path, tickets);
                if !current {
                    trace!(%path, "dropping stale validation result");
                }
                current
            })
            .collect()
    }

    /// Makes results of in-flight passes for `prefix` and everything below it
    /// stale. Used when an edit moves, removes or reshapes those fields.
    ///
    /// The generations of those paths are forgotten: a ticket with no
    /// matching entry is never current, and removed paths leave no trace.
    pub(crate) fn invalidate_under(&self, prefix: &Path) {
        self.inner
            .generations
            .borrow_mut()
            .retain(|path, _| !path.starts_with(prefix));
    }

    #[cfg(test)]
    fn tracked_generations(&self) -> usize {
        self.inner.generations.borrow().len()
    }
}

#[cfg(test)]
mod tests {
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

    #[test]
    fn new_form_is_clean() {
        let form = Form::new(FormConfig::new(json!({"name": "", "tags": ["a"]})));
        assert_eq!(form.touched().get(), json!({"name": false, "tags": [false]}));
        assert_eq!(form.dirty().get(), json!({"name": false, "tags": [false]}));
        assert_eq!(form.errors().get(), json!({}));
        let state = form.state().get();
        assert!(state.is_valid && !state.is_dirty && !state.is_touched);
    }

    #[test]
    fn initial_overrides() {
        let form = Form::new(
            FormConfig::new(json!({"name": "", "email": ""}))
                .initial_touched(json!({"email": true, "unknown": true}))
                .initial_errors(json!({"email": "Taken"})),
        );
        assert_eq!(form.touched().get(), json!({"name": false, "email": true}));
        let state = form.state().get();
        assert!(state.is_touched);
        assert!(state.has_errors);
        assert!(!state.is_valid);
    }

    #[test]
    fn change_marks_dirty_against_defaults() {
        let form = Form::new(FormConfig::new(json!({"name": "a"})));
        block_on(form.handle_change("name", json!("b"))).unwrap();
        assert_eq!(form.dirty().get(), json!({"name": true}));
        block_on(form.handle_change("name", json!("a"))).unwrap();
        assert_eq!(form.dirty().get(), json!({"name": false}));
    }

    #[test]
    fn change_without_validate_on_change_leaves_errors() {
        let form = Form::new(
            FormConfig::new(json!({"name": "x"}))
                .validators(Validators::fields([("name", required())]))
                .validate_on(ValidateOn::SUBMIT),
        );
        block_on(form.handle_change("name", json!(""))).unwrap();
        assert_eq!(form.error("name"), None);
    }

    #[test]
    fn focus_validates_only_when_configured() {
        let validators = Validators::fields([("name", required())]);
        let form = Form::new(FormConfig::new(json!({"name": ""})).validators(validators.clone()));
        block_on(form.handle_focus("name")).unwrap();
        assert_eq!(form.error("name"), None);

        let form = Form::new(
            FormConfig::new(json!({"name": ""}))
                .validators(validators)
                .validate_on(ValidateOn::FOCUS),
        );
        block_on(form.handle_focus("name")).unwrap();
        assert_eq!(form.error("name"), Some(json!("Required")));
    }

    #[test]
    fn value_reports_missing_paths() {
        let form = Form::new(FormConfig::new(json!({"a": 1})));
        assert_eq!(form.value("a").unwrap(), json!(1));
        assert!(matches!(form.value("b"), Err(FormError::NotFound { .. })));
    }

    #[test]
    fn field_array_requires_array() {
        let form = Form::new(FormConfig::new(json!({"name": "", "tags": []})));
        assert!(form.use_field_array("tags").is_ok());
        match form.use_field_array("name") {
            Err(FormError::NotAnArray { path, found }) => {
                assert_eq!(path, Path::parse("name"));
                assert_eq!(found, "string");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            form.use_field_array("missing"),
            Err(FormError::NotAnArray { found: "nothing", .. })
        ));
    }

    #[test]
    fn schema_mode_merges_resolver_output() {
        let resolver = Resolver::new(|values| {
            if values["age"].as_u64().unwrap_or(0) < 18 {
                json!({"age": "Too young"})
            } else {
                json!({})
            }
        });
        let form = Form::new(FormConfig::new(json!({"name": "x", "age": 10})).resolver(resolver));
        assert!(!block_on(form.validate_form()).unwrap());
        assert_eq!(form.errors().get(), json!({"name": false, "age": "Too young"}));

        block_on(form.handle_change("age", json!(30))).unwrap();
        assert_eq!(form.error("age"), Some(json!(false)));
        assert!(form.state().get().is_valid);
    }

    #[test]
    fn removed_fields_leave_no_generations() {
        let form = Form::new(
            FormConfig::new(json!({"roles": ["a", "b"], "name": ""})).validators(Validators::fields([
                ("roles", Validators::Empty.with_all(required())),
                ("name", required()),
            ])),
        );
        assert!(!block_on(form.validate_form()).unwrap());
        let before = form.tracked_generations();
        assert!(before >= 3);

        form.use_field_array("roles").unwrap().remove(0);
        assert!(form.tracked_generations() < before);
        form.remove_field("roles");
        form.remove_field("name");
        assert_eq!(form.tracked_generations(), 0);
    }

    #[test]
    fn set_dependencies_recompiles() {
        let form = Form::new(FormConfig::new(json!({"password": "", "confirm": ""})));
        assert!(form.triggers_for("password").is_empty());
        form.set_dependencies(Dependencies::fields([(
            "confirm",
            Dependencies::field(["password"]),
        )]));
        assert_eq!(form.triggers_for("password"), vec![Path::parse("confirm")]);
    }
}
