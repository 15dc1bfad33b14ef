//! The storage collaborator seam.

use async_trait::async_trait;
use contentkit_schema::Record;
use thiserror::Error;

use crate::descriptor::{MutationDescriptor, MutationOutcome, QueryDescriptor};

/// Failures reported by a storage backend. Passed through to callers as-is.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend has no collection for the resource.
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    /// The backend rejected the write (unique keys, foreign keys, ...).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A row came back without the `id` single-entity writes are pinned to.
    #[error("row from '{0}' carries no id")]
    MissingId(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// A physical storage engine.
///
/// Implementations receive descriptors that were already validated against
/// the resource they carry. They must not retry on their own behalf unless
/// that is the backend's documented policy; the engine never retries.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Run a read and return rows in backend order (after the requested sort).
    async fn query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, StorageError>;

    /// Single-entity existence lookup: the first row matching the filter.
    async fn find_one(&self, query: &QueryDescriptor) -> Result<Option<Record>, StorageError>;

    /// Apply a write.
    async fn mutate(&self, mutation: &MutationDescriptor) -> Result<MutationOutcome, StorageError>;
}
