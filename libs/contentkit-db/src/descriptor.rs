//! Backend-agnostic query and mutation descriptors.
//!
//! Descriptors are produced fresh per call by the [`crate::Translator`] and
//! can only be constructed there, so every descriptor a storage backend sees
//! has already been validated against the resource it references.

use std::sync::Arc;

use contentkit_schema::{Record, Resource};
use serde::{Deserialize, Serialize};

use crate::filter::Filter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortField {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parse the compact form: `"title"` ascending, `"-title"` descending.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(raw),
        }
    }
}

/// Projection, ordering and paging for list queries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Fields to return; empty means all fields. `id` is always returned.
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SortField) -> Self {
        self.sort.push(sort);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// A validated read against one resource.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    resource: Arc<Resource>,
    filter: Option<Filter>,
    options: QueryOptions,
}

impl QueryDescriptor {
    pub(crate) fn new(resource: Arc<Resource>, filter: Option<Filter>, options: QueryOptions) -> Self {
        Self {
            resource,
            filter,
            options,
        }
    }

    /// The registry entry this descriptor was built against.
    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }
}

/// What a mutation does and how wide its scope may be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    /// Update exactly one existing entity.
    Update,
    /// Update every entity matching the target.
    BulkUpdate,
    /// Delete exactly one existing entity.
    Delete,
    /// Delete every entity matching the target.
    BulkDelete,
}

impl MutationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::BulkUpdate => "bulk_update",
            Self::Delete => "delete",
            Self::BulkDelete => "bulk_delete",
        }
    }

    /// Single-entity mutations run check-then-act against storage.
    #[must_use]
    pub fn is_single_entity(self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Everything but create must name its target rows.
    #[must_use]
    pub fn requires_target(self) -> bool {
        !matches!(self, Self::Create)
    }

    #[must_use]
    pub fn carries_payload(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::BulkUpdate)
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated write against one resource.
#[derive(Clone, Debug)]
pub struct MutationDescriptor {
    resource: Arc<Resource>,
    kind: MutationKind,
    payload: Record,
    target: Option<Filter>,
}

impl MutationDescriptor {
    pub(crate) fn new(
        resource: Arc<Resource>,
        kind: MutationKind,
        payload: Record,
        target: Option<Filter>,
    ) -> Self {
        Self {
            resource,
            kind,
            payload,
            target,
        }
    }

    /// Same mutation, retargeted. Used to pin a single-entity mutation to
    /// the row found by the existence check.
    pub(crate) fn with_target(&self, target: Filter) -> Self {
        Self {
            resource: Arc::clone(&self.resource),
            kind: self.kind,
            payload: self.payload.clone(),
            target: Some(target),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    #[must_use]
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    #[must_use]
    pub fn payload(&self) -> &Record {
        &self.payload
    }

    #[must_use]
    pub fn target(&self) -> Option<&Filter> {
        self.target.as_ref()
    }
}

/// What storage reports back for a mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub affected: u64,
    /// Ids of created/updated/deleted rows, when the backend knows them.
    #[serde(default)]
    pub ids: Vec<u64>,
}
