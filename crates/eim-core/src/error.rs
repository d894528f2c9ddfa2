//! Error taxonomy for record application.
//!
//! Every failure is a value returned to the caller. Whether a failed record
//! aborts the whole record set is decided by the dispatcher's policy.

use crate::record::FieldKind;
use thiserror::Error;

/// A raw field value failed its schema constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field '{field}' exceeds maximum length {max} (got {len})")]
    TooLong { field: String, max: usize, len: usize },

    #[error("field '{field}' may not be null")]
    Null { field: String },

    #[error("field '{field}' must be {expected}, got {found}")]
    WrongType {
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("field '{field}' is not a valid timestamp: {value}")]
    InvalidTimestamp { field: String, value: String },

    #[error("field '{field}' is not a valid decimal: {value}")]
    InvalidDecimal { field: String, value: String },

    #[error("field '{field}' is not valid UTF-8 text")]
    InvalidClob { field: String },

    #[error("field '{field}' has an invalid value: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// A precondition of the schema contract was not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralViolation {
    #[error("record for {found} sent to the {expected} applicator")]
    SchemaMismatch { expected: String, found: String },

    #[error("item {uid} is not a {expected}")]
    WrongItemKind { uid: String, expected: String },

    #[error("record for {namespace} is missing required field '{field}'")]
    MissingRequiredField { namespace: String, field: String },

    #[error("item {uid} has no {stamp} stamp")]
    MissingStamp { uid: String, stamp: String },
}

/// Resolution of a modification link failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkageError {
    #[error("item {uid} has no parent collection to resolve '{parent_uid}' against")]
    NoParentCollection { uid: String, parent_uid: String },

    #[error("parent '{parent_uid}' not found among the siblings of {uid}")]
    ParentNotFound { uid: String, parent_uid: String },

    #[error("parent '{parent_uid}' matches {count} siblings of {uid}")]
    AmbiguousParent {
        uid: String,
        parent_uid: String,
        count: usize,
    },

    #[error("item '{parent_uid}' cannot be the master of {uid}")]
    IncompatibleKind { uid: String, parent_uid: String },

    #[error("item {uid} cannot modify itself")]
    SelfReference { uid: String },
}

/// Opaque failure from the calendar validator collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("calendar data could not be parsed: {0}")]
    Parse(String),

    #[error("calendar data contains no VEVENT")]
    NoEvent,

    #[error("calendar data is invalid: {0}")]
    Invalid(String),
}

/// Failure applying one record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown field '{field}' for {namespace}")]
    UnknownField { namespace: String, field: String },

    #[error(transparent)]
    Structural(#[from] StructuralViolation),

    #[error(transparent)]
    Linkage(#[from] LinkageError),

    #[error("deleted records are not supported for {namespace}")]
    DeletionUnsupported { namespace: String },

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

impl SchemaError {
    /// Contract failures that should fail the whole apply operation rather
    /// than be tolerated by a best-effort caller.
    pub fn is_structural(&self) -> bool {
        matches!(self, SchemaError::Structural(_))
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
