//! Per-request state carried through the hook pipeline.

use std::collections::HashMap;

use contentkit_db::{Filter, MutationOutcome, QueryOptions};
use contentkit_schema::{Action, Record};
use contentkit_security::RoleId;
use tokio_util::sync::CancellationToken;

/// Which rows a read, update or delete addresses.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Target {
    /// No explicit target; bulk actions fall back to [`RequestContext::filter`].
    #[default]
    None,
    /// One entity by primary key.
    Id(u64),
    /// Every entity matching the filter.
    Filter(Filter),
}

/// The in-flight request.
///
/// Resource and action are fixed at construction. Hooks may rewrite
/// everything else (roles, target, filter, payload, options, values).
#[derive(Clone, Debug)]
pub struct RequestContext {
    resource: String,
    action: Action,
    pub role_ids: Vec<RoleId>,
    pub target: Target,
    pub filter: Option<Filter>,
    pub payload: Record,
    pub options: QueryOptions,
    /// Free-form values hooks use to pass data along the pipeline.
    pub values: HashMap<String, serde_json::Value>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(resource: impl Into<String>, action: Action) -> Self {
        Self {
            resource: resource.into(),
            action,
            role_ids: Vec::new(),
            target: Target::None,
            filter: None,
            payload: Record::new(),
            options: QueryOptions::default(),
            values: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    #[must_use]
    pub fn with_roles(mut self, ids: impl IntoIterator<Item = impl Into<RoleId>>) -> Self {
        self.role_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: u64) -> Self {
        self.target = Target::Id(id);
        self
    }

    #[must_use]
    pub fn with_target(mut self, filter: Filter) -> Self {
        self.target = Target::Filter(filter);
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Record) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn set_value(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What an action produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ActionOutput {
    /// A created, read or updated entity.
    Record(Record),
    /// A list result.
    Records(Vec<Record>),
    /// A bulk mutation summary.
    Mutation(MutationOutcome),
    /// The entity as it was before deletion.
    Deleted(Record),
}

impl ActionOutput {
    #[must_use]
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) | Self::Deleted(r) => Some(r),
            Self::Records(_) | Self::Mutation(_) => None,
        }
    }

    #[must_use]
    pub fn records(&self) -> Option<&[Record]> {
        match self {
            Self::Records(rows) => Some(rows),
            _ => None,
        }
    }
}
