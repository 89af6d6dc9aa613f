//! Error types for form operations.

use std::fmt;

use thiserror::Error;

use crate::path::Path;

/// Result type alias for form operations.
pub type FormResult<T> = Result<T, FormError>;

/// Which side of a validator/value pair disagreed about the node kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeMismatch {
    /// The value is an object or array but the validator node is a function.
    FunctionForContainer,
    /// The value is a primitive but the validator node is an object or array.
    ContainerForPrimitive,
    /// The validator node and the value are containers of different kinds.
    ContainerKind,
}

#[derive(Debug, Error)]
pub enum FormError {
    #[error("validator shape mismatch at {path}: {kind}")]
    ValidatorShapeMismatch { path: Path, kind: ShapeMismatch },

    /// Returned by the checked accessors when nothing lives at `path`.
    #[error("nothing found at {path}")]
    NotFound { path: Path },

    #[error("field array {path} expects an array value, found {found}")]
    NotAnArray { path: Path, found: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FormError {
    pub fn shape_mismatch(path: Path, kind: ShapeMismatch) -> Self {
        FormError::ValidatorShapeMismatch { path, kind }
    }

    pub fn not_found(path: Path) -> Self {
        FormError::NotFound { path }
    }

    pub fn config(message: impl Into<String>) -> Self {
        FormError::Config(message.into())
    }
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ShapeMismatch::FunctionForContainer => {
                "validator must be an object or array when value is an object or array"
            }
            ShapeMismatch::ContainerForPrimitive => {
                "validator must be a function when value is a primitive"
            }
            ShapeMismatch::ContainerKind => "validator container kind does not match the value",
        };
        f.write_str(message)
    }
}

/// Name of the JSON kind of `value`, used in error messages.
pub fn value_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
