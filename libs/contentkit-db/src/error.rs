use thiserror::Error;

use crate::descriptor::MutationKind;
use crate::storage::StorageError;

/// Rejections raised while building descriptors. Nothing has touched
/// storage when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("unknown resource '{resource}'")]
    UnknownResource { resource: String },

    #[error("invalid predicate on '{field}': {reason}")]
    InvalidPredicate { field: String, reason: String },

    #[error("invalid payload field '{field}': {reason}")]
    InvalidPayload { field: String, reason: String },

    /// Update/delete without target predicates would touch every row.
    #[error("{kind} on '{resource}' requires a target predicate")]
    UnboundedScope { resource: String, kind: MutationKind },
}

impl TranslateError {
    pub fn predicate(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn payload(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from executing descriptors through [`crate::ContentRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// The existence check found no row for the target.
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// An exactly-one lookup matched several rows.
    #[error("{resource} lookup matched more than one row")]
    NotUnique { resource: String },

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("operation cancelled")]
    Cancelled,
}

impl RepositoryError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}
