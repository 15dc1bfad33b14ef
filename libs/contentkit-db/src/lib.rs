#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! ContentKit data access.
//!
//! - [`Filter`] - predicate value objects
//! - [`Translator`] - schema-aware construction of [`QueryDescriptor`] / [`MutationDescriptor`]
//! - [`Storage`] - the physical storage seam, with [`MemoryStorage`] as reference backend
//! - [`ContentRepository`] - executes descriptors (existence checks, cancellation)

pub mod descriptor;
pub mod error;
pub mod filter;
pub mod memory;
pub mod repository;
pub mod storage;
pub mod translator;

pub use descriptor::{
    MutationDescriptor, MutationKind, MutationOutcome, QueryDescriptor, QueryOptions,
    SortDirection, SortField,
};
pub use error::{RepositoryError, TranslateError};
pub use filter::{CompareOp, Filter};
pub use memory::MemoryStorage;
pub use repository::ContentRepository;
pub use storage::{Storage, StorageError};
pub use translator::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT, Translator, validate_filter};
