#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! ContentKit schema model.
//!
//! - [`ResourceDef`] / [`Field`] - declarative resource definitions
//! - [`Resource`] - an immutable, registered resource (always carries the `id` key)
//! - [`Schema`] - one generation-tagged snapshot of all resources
//! - [`SchemaRegistry`] - holds the current snapshot and swaps it atomically
//! - [`Value`] / [`Record`] - backend-agnostic field values and rows

pub mod error;
pub mod field;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod value;

pub use error::SchemaError;
pub use field::{Field, FieldType, RelationDef, RelationKind};
pub use registry::SchemaRegistry;
pub use resource::{Action, ID_FIELD, Resource, ResourceDef};
pub use schema::{Schema, SchemaDiff, SchemaGeneration};
pub use value::{Record, Value};
