use contentkit_db::{RepositoryError, StorageError, TranslateError};
use contentkit_schema::{Action, SchemaError};
use contentkit_security::AccessError;

use crate::domain::hooks::HookError;
use crate::domain::migration::MigrationError;

/// Stable, transport-independent classification of [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidPredicate,
    InvalidPayload,
    UnboundedScope,
    Forbidden,
    Busy,
    MigrationValidationFailed,
    HookAborted,
    PostActionHookFailed,
    StorageFailure,
    Cancelled,
    HandlerMissing,
    Config,
}

impl ErrorKind {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidPredicate => "invalid_predicate",
            Self::InvalidPayload => "invalid_payload",
            Self::UnboundedScope => "unbounded_scope",
            Self::Forbidden => "forbidden",
            Self::Busy => "busy",
            Self::MigrationValidationFailed => "migration_validation_failed",
            Self::HookAborted => "hook_aborted",
            Self::PostActionHookFailed => "post_action_hook_failed",
            Self::StorageFailure => "storage_failure",
            Self::Cancelled => "cancelled",
            Self::HandlerMissing => "handler_missing",
            Self::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error(transparent)]
    Translate(#[from] TranslateError),

    /// An exactly-one target matched several rows.
    #[error("target on '{resource}' matched more than one row")]
    AmbiguousTarget { resource: String },

    #[error(transparent)]
    Access(#[from] AccessError),

    /// A before-resolve hook refused the request; the action never ran.
    #[error("aborted by hook: {0}")]
    HookAborted(HookError),

    /// An after-resolve hook failed. The action itself already committed.
    #[error("post-action hook failed, action was committed: {0}")]
    PostActionHookFailed(HookError),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("storage failure: {0}")]
    Storage(#[source] StorageError),

    #[error("request cancelled")]
    Cancelled,

    #[error("no handler for {action} on '{resource}'")]
    HandlerMissing { resource: String, action: Action },

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. }
            | Self::Translate(TranslateError::UnknownResource { .. }) => ErrorKind::NotFound,
            Self::Translate(TranslateError::InvalidPredicate { .. })
            | Self::AmbiguousTarget { .. } => ErrorKind::InvalidPredicate,
            Self::Translate(TranslateError::InvalidPayload { .. }) => ErrorKind::InvalidPayload,
            Self::Translate(TranslateError::UnboundedScope { .. }) => ErrorKind::UnboundedScope,
            Self::Access(_) => ErrorKind::Forbidden,
            Self::HookAborted(_) => ErrorKind::HookAborted,
            Self::PostActionHookFailed(_) => ErrorKind::PostActionHookFailed,
            Self::Migration(MigrationError::Busy) => ErrorKind::Busy,
            Self::Migration(MigrationError::ValidationFailed(_)) => {
                ErrorKind::MigrationValidationFailed
            }
            Self::Storage(_) => ErrorKind::StorageFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::HandlerMissing { .. } => ErrorKind::HandlerMissing,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<SchemaError> for EngineError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::NotFound { resource } => Self::not_found(resource),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Translate(t) => Self::Translate(t),
            RepositoryError::NotFound { resource } => Self::not_found(resource),
            RepositoryError::NotUnique { resource } => Self::AmbiguousTarget { resource },
            RepositoryError::Storage(s) => {
                tracing::warn!(error = %s, "Storage call failed");
                Self::Storage(s)
            }
            RepositoryError::Cancelled => Self::Cancelled,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn repository_errors_keep_their_kind() {
        let cases = [
            (RepositoryError::not_found("post"), ErrorKind::NotFound),
            (
                RepositoryError::Translate(TranslateError::UnknownResource {
                    resource: "page".to_owned(),
                }),
                ErrorKind::NotFound,
            ),
            (
                RepositoryError::Translate(TranslateError::payload("title", "required")),
                ErrorKind::InvalidPayload,
            ),
            (RepositoryError::Cancelled, ErrorKind::Cancelled),
            (
                RepositoryError::Storage(StorageError::Constraint("dup".to_owned())),
                ErrorKind::StorageFailure,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(EngineError::from(err).kind(), kind);
        }
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::PostActionHookFailed.code(), "post_action_hook_failed");
        assert_eq!(ErrorKind::MigrationValidationFailed.to_string(), "migration_validation_failed");
        assert_eq!(
            EngineError::Migration(MigrationError::Busy).kind().code(),
            "busy"
        );
    }
}
