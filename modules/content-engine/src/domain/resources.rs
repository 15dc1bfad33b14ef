//! Resource registration and the action handlers dispatch consults.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use contentkit_db::{ContentRepository, Filter, TranslateError};
use contentkit_schema::{Action, ID_FIELD, Resource, Schema};
use contentkit_security::Grant;

use crate::domain::context::{ActionOutput, RequestContext, Target};
use crate::domain::error::EngineError;

/// Everything a handler needs for one call. The schema is the snapshot
/// captured when the request entered the engine.
#[derive(Debug)]
pub struct ActionCall<'a> {
    pub ctx: &'a RequestContext,
    pub schema: Arc<Schema>,
    pub resource: Arc<Resource>,
    pub grant: Grant,
}

impl ActionCall<'_> {
    /// Caller filter ANDed with the grant's row constraint.
    #[must_use]
    pub fn scoped_filter(&self) -> Option<Filter> {
        Filter::conjoin(self.ctx.filter.clone(), self.grant.constraint.clone())
    }

    /// `target` ANDed with the grant's row constraint. An absent target stays
    /// absent so unbounded writes are still rejected.
    #[must_use]
    pub fn scoped_target(&self, target: Option<Filter>) -> Option<Filter> {
        target.map(|t| match &self.grant.constraint {
            Some(c) => t.and(c.clone()),
            None => t,
        })
    }
}

/// Executes one action for a resource.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// # Errors
    ///
    /// Any [`EngineError`]; the pipeline returns it unchanged.
    async fn handle(&self, call: &ActionCall<'_>) -> Result<ActionOutput, EngineError>;
}

/// Handlers attached to one named resource.
#[derive(Clone)]
pub struct ResourceBinding {
    resource: String,
    handlers: BTreeMap<Action, Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for ResourceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBinding")
            .field("resource", &self.resource)
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResourceBinding {
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            handlers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn handler(mut self, action: Action, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(action, handler);
        self
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

/// Binding lookup with an optional fallback handler for every resource.
#[derive(Clone, Default)]
pub struct ResourceManager {
    bindings: HashMap<String, ResourceBinding>,
    fallback: Option<Arc<dyn ActionHandler>>,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("bindings", &self.bindings.values().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ResourceManager {
    #[must_use]
    pub fn new(fallback: Option<Arc<dyn ActionHandler>>) -> Self {
        Self {
            bindings: HashMap::new(),
            fallback,
        }
    }

    /// Attach handlers; a second binding for the same resource adds to (and
    /// overrides per action) the first.
    pub fn add_resource(&mut self, binding: ResourceBinding) {
        match self.bindings.get_mut(&binding.resource) {
            Some(existing) => existing.handlers.extend(binding.handlers),
            None => {
                self.bindings.insert(binding.resource.clone(), binding);
            }
        }
    }

    #[must_use]
    pub fn handler_for(&self, resource: &str, action: Action) -> Option<Arc<dyn ActionHandler>> {
        self.bindings
            .get(resource)
            .and_then(|b| b.handlers.get(&action))
            .or(self.fallback.as_ref())
            .cloned()
    }

    /// Names of bound resources missing from `schema`, sorted.
    #[must_use]
    pub fn stale_bindings(&self, schema: &Schema) -> Vec<&str> {
        let mut stale: Vec<&str> = self
            .bindings
            .keys()
            .map(String::as_str)
            .filter(|name| !schema.contains(name))
            .collect();
        stale.sort_unstable();
        stale
    }

    /// Check bindings against `schema`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Config`] for bindings naming unknown resources
    /// - [`EngineError::HandlerMissing`] for the first (resource, action)
    ///   without a handler, when `require_complete` is set
    pub fn validate(&self, schema: &Schema, require_complete: bool) -> Result<(), EngineError> {
        let stale = self.stale_bindings(schema);
        if !stale.is_empty() {
            return Err(EngineError::config(format!(
                "handlers bound to unknown resources: {}",
                stale.join(", ")
            )));
        }
        if require_complete {
            for name in schema.names() {
                for action in Action::ALL {
                    if self.handler_for(name, action).is_none() {
                        return Err(EngineError::HandlerMissing {
                            resource: name.to_owned(),
                            action,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Maps actions onto the [`ContentRepository`].
///
/// | action | target        | repository call          | output     |
/// |--------|---------------|--------------------------|------------|
/// | create | -             | `create`                 | `Record`   |
/// | read   | id / filter   | `only`                   | `Record`   |
/// | update | id            | `update_one`             | `Record`   |
/// | update | filter / none | `bulk_update`            | `Mutation` |
/// | delete | id            | `delete_one`             | `Deleted`  |
/// | delete | filter / none | `bulk_delete`            | `Mutation` |
/// | list   | -             | `list`                   | `Records`  |
///
/// Without a target, bulk writes use the context filter; if that is absent
/// too the write is rejected as unbounded. Grant constraints are ANDed into
/// every filter and target; creates are not constrained.
#[derive(Clone, Debug)]
pub struct ContentHandler {
    repository: ContentRepository,
}

impl ContentHandler {
    #[must_use]
    pub fn new(repository: ContentRepository) -> Self {
        Self { repository }
    }
}

fn id_filter(id: u64) -> Filter {
    Filter::eq(ID_FIELD, id)
}

#[async_trait]
impl ActionHandler for ContentHandler {
    async fn handle(&self, call: &ActionCall<'_>) -> Result<ActionOutput, EngineError> {
        let ctx = call.ctx;
        let schema = call.schema.as_ref();
        let name = call.resource.name();
        let cancel = &ctx.cancel;
        let repo = &self.repository;

        let output = match ctx.action() {
            Action::Create => {
                ActionOutput::Record(repo.create(schema, name, ctx.payload.clone(), cancel).await?)
            }
            Action::Read => {
                let target = match &ctx.target {
                    Target::Id(id) => Some(id_filter(*id)),
                    Target::Filter(f) => Some(f.clone()),
                    Target::None => ctx.filter.clone(),
                };
                let Some(target) = call.scoped_target(target) else {
                    return Err(TranslateError::predicate(ID_FIELD, "read requires a target").into());
                };
                ActionOutput::Record(repo.only(schema, name, target, cancel).await?)
            }
            Action::Update => match &ctx.target {
                Target::Id(id) => {
                    let target = call.scoped_target(Some(id_filter(*id))).unwrap_or_else(|| id_filter(*id));
                    ActionOutput::Record(
                        repo.update_one(schema, name, target, ctx.payload.clone(), cancel)
                            .await?,
                    )
                }
                Target::Filter(f) => ActionOutput::Mutation(
                    repo.bulk_update(
                        schema,
                        name,
                        call.scoped_target(Some(f.clone())),
                        ctx.payload.clone(),
                        cancel,
                    )
                    .await?,
                ),
                Target::None => ActionOutput::Mutation(
                    repo.bulk_update(
                        schema,
                        name,
                        call.scoped_target(ctx.filter.clone()),
                        ctx.payload.clone(),
                        cancel,
                    )
                    .await?,
                ),
            },
            Action::Delete => match &ctx.target {
                Target::Id(id) => {
                    let target = call.scoped_target(Some(id_filter(*id))).unwrap_or_else(|| id_filter(*id));
                    ActionOutput::Deleted(repo.delete_one(schema, name, target, cancel).await?)
                }
                Target::Filter(f) => ActionOutput::Mutation(
                    repo.bulk_delete(schema, name, call.scoped_target(Some(f.clone())), cancel)
                        .await?,
                ),
                Target::None => ActionOutput::Mutation(
                    repo.bulk_delete(schema, name, call.scoped_target(ctx.filter.clone()), cancel)
                        .await?,
                ),
            },
            Action::List => {
                let filter = match &ctx.target {
                    Target::Filter(f) => Filter::conjoin(Some(f.clone()), call.scoped_filter()),
                    Target::Id(id) => Filter::conjoin(Some(id_filter(*id)), call.scoped_filter()),
                    Target::None => call.scoped_filter(),
                };
                ActionOutput::Records(
                    repo.list(schema, name, filter, ctx.options.clone(), cancel)
                        .await?,
                )
            }
        };
        Ok(output)
    }
}
