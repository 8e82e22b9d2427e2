use thiserror::Error;

use crate::entity::EntityKind;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId { value: String, reason: String },

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("{kind} has no field named {field:?}")]
    UnknownField { kind: EntityKind, field: String },

    #[error("field {field:?} expects {expected}, got {found}")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {field:?} must be a finite number")]
    NonFinite { field: String },

    #[error("cannot parse {input:?} as {expected}")]
    Parse {
        input: String,
        expected: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for type-level results.
pub type TypeResult<T> = Result<T, TypeError>;
