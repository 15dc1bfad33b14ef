//! Error types for schema construction and lookup.

use thiserror::Error;

/// Errors raised while building, validating or resolving a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The requested resource is not part of the current schema.
    #[error("resource '{resource}' not found")]
    NotFound { resource: String },

    /// Two resources in one schema share a name.
    #[error("duplicate resource '{0}'")]
    DuplicateResource(String),

    /// A resource declares the same field twice.
    #[error("duplicate field '{field}' in resource '{resource}'")]
    DuplicateField { resource: String, field: String },

    /// Resource or field name is empty or contains unsupported characters.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A resource tries to redeclare a system field.
    #[error("field '{field}' is reserved in resource '{resource}'")]
    ReservedField { resource: String, field: String },

    /// A relation field points at a resource that is not in the same schema.
    #[error("relation '{resource}.{field}' targets unknown resource '{target}'")]
    UnresolvedRelation {
        resource: String,
        field: String,
        target: String,
    },

    /// An enum field has no allowed values.
    #[error("enum field '{resource}.{field}' declares no values")]
    EmptyEnum { resource: String, field: String },

    /// A field default is not accepted by the field's own type.
    #[error("default of '{resource}.{field}' does not match the field type")]
    InvalidDefault { resource: String, field: String },

    /// An action name that is not one of the closed action set.
    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

impl SchemaError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}
