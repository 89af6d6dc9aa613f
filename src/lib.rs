//! # floem_form
//! Headless form state: a nested value tree plus the touched, dirty, error,
//! validator and dependency trees that shadow it, kept consistent through
//! every edit and exposed as observable cells a view layer can subscribe to.
//!
//! ## Example: sign-up form
//! ```rust
//! use floem_form::{Form, FormConfig, Validators};
//! use futures::executor::block_on;
//! use serde_json::json;
//!
//! let required = || {
//!     Validators::field(|value, _| {
//!         value
//!             .as_str()
//!             .is_some_and(str::is_empty)
//!             .then(|| "Required".to_string())
//!     })
//! };
//!
//! let form = Form::new(
//!     FormConfig::new(json!({"name": "", "email": ""}))
//!         .validators(Validators::fields([("name", required()), ("email", required())])),
//! );
//!
//! block_on(form.handle_change("name", json!("Ada"))).unwrap();
//! assert!(block_on(form.validate_form()).is_ok_and(|valid| !valid));
//! assert_eq!(form.errors().get(), json!({"name": false, "email": "Required"}));
//! ```
//!
//! ## Paths
//! Every field is addressed by a [`Path`]: `"roles.0.name"` parsed once into
//! segments, or built with [`path!`]. The functions in [`tree`] read and edit
//! any of the trees by path and never panic on a path that does not fit.
//!
//! ## Validators
//! [`Validators`] mirrors the value tree. Container nodes can carry a
//! validator for the whole value, a node applied to every array element and
//! per-element children. Resolution order is always outer to inner, and for
//! each element the shared node before the element's own.
//!
//! ## Dependencies
//! A field can declare [`Dependencies`] on other fields, with `*` standing for
//! any array index. Changing one of them revalidates the declaring field.
//!
//! ## Field arrays
//! [`Form::use_field_array`] returns a [`FieldArray`] whose append, prepend,
//! remove and swap keep every tree index-aligned with the values.

pub mod deep;
mod dependencies;
mod error;
mod event;
mod field_array;
mod form;
mod path;
mod state;
pub mod tree;
pub mod triggers;
pub mod validator;

pub use dependencies::Dependencies;
pub use error::{FormError, FormResult, ShapeMismatch, value_type_name};
pub use event::{FieldAction, FieldEvent, Phase};
pub use field_array::{FieldArray, FieldArrayOptions};
pub use form::{
    AddFieldOptions, Form, FormConfig, ResetFieldOptions, ResetFormOptions, Resolver,
    SetFieldOptions,
};
pub use path::{Path, Seg};
pub use state::{FormState, ValidateOn};
pub use validator::{FieldContext, Modifiers, Validator, Validators};

pub use floem_form_reactive as reactive;
