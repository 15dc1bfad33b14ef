//! The engine: dispatch orchestration over registry, resolver, hooks and
//! handlers, plus the administrative surface (migrations, role lookups).

use std::sync::Arc;

use async_trait::async_trait;
use contentkit_db::{ContentRepository, MemoryStorage, Storage, Translator};
use contentkit_schema::{Action, Resource, Schema, SchemaGeneration, SchemaRegistry};
use contentkit_security::{Permission, PermissionResolver, Role, RoleId, RoleStore};

use crate::config::EngineConfig;
use crate::domain::context::{ActionOutput, RequestContext};
use crate::domain::error::EngineError;
use crate::domain::hooks::{HookPipeline, Hooks};
use crate::domain::migration::{
    Migration, MigrationCoordinator, MigrationReport, MigrationState, PendingMigration, Reload,
};
use crate::domain::resources::{
    ActionCall, ActionHandler, ContentHandler, ResourceBinding, ResourceManager,
};

/// Re-checks resource bindings after every migration. Stale bindings are
/// reported, never rolled back.
struct BindingCheck {
    resources: Arc<ResourceManager>,
    require_complete: bool,
}

#[async_trait]
impl Reload for BindingCheck {
    fn name(&self) -> &str {
        "resource-bindings"
    }

    async fn reload(&self, migration: &Migration) -> anyhow::Result<()> {
        let stale = self.resources.stale_bindings(&migration.schema);
        if !stale.is_empty() {
            tracing::warn!(?stale, generation = %migration.to, "Resource bindings outlived their resources");
        }
        self.resources
            .validate(&migration.schema, self.require_complete)
            .map_err(anyhow::Error::from)
    }
}

/// Keeps in-memory collections in step with the schema.
#[async_trait]
impl Reload for MemoryStorage {
    fn name(&self) -> &str {
        "memory-storage"
    }

    async fn reload(&self, migration: &Migration) -> anyhow::Result<()> {
        self.sync_schema(&migration.schema);
        Ok(())
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    registry: Arc<SchemaRegistry>,
    roles: Arc<dyn RoleStore>,
    storage: Arc<dyn Storage>,
    hooks: Hooks,
    bindings: Vec<ResourceBinding>,
    reloaders: Vec<Arc<dyn Reload>>,
    content_handler: bool,
}

impl EngineBuilder {
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn resource(mut self, binding: ResourceBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    #[must_use]
    pub fn reloader(mut self, reloader: Arc<dyn Reload>) -> Self {
        self.reloaders.push(reloader);
        self
    }

    /// Do not fall back to the repository-backed content handler; only
    /// explicitly bound handlers are used.
    #[must_use]
    pub fn without_content_handler(mut self) -> Self {
        self.content_handler = false;
        self
    }

    /// # Errors
    ///
    /// - [`EngineError::Config`] for invalid configuration or bindings that
    ///   name unknown resources
    /// - [`EngineError::HandlerMissing`] when handler completeness is
    ///   required and a (resource, action) pair has no handler
    pub fn build(self) -> Result<Engine, EngineError> {
        self.config.validate()?;

        let translator =
            Translator::new(self.config.default_list_limit, self.config.max_list_limit);
        let repository = ContentRepository::new(self.storage, translator);
        let fallback: Option<Arc<dyn ActionHandler>> = if self.content_handler {
            Some(Arc::new(ContentHandler::new(repository.clone())))
        } else {
            None
        };

        let mut resources = ResourceManager::new(fallback);
        for binding in self.bindings {
            resources.add_resource(binding);
        }
        let schema = self.registry.snapshot();
        resources.validate(&schema, self.config.require_handler_completeness)?;
        let resources = Arc::new(resources);

        let resolver = Arc::new(PermissionResolver::new(self.roles));
        resolver.refresh_for(&schema);

        let mut migrations =
            MigrationCoordinator::new(Arc::clone(&self.registry), Arc::clone(&resolver))
                .with_reloader(Arc::new(BindingCheck {
                    resources: Arc::clone(&resources),
                    require_complete: self.config.require_handler_completeness,
                }));
        for reloader in self.reloaders {
            migrations = migrations.with_reloader(reloader);
        }

        tracing::info!(
            key = %self.config.key,
            generation = %schema.generation(),
            resources = schema.len(),
            hooks = self.hooks.len(),
            "Content engine built"
        );
        Ok(Engine {
            config: self.config,
            registry: self.registry,
            resolver,
            resources,
            pipeline: HookPipeline::new(self.hooks),
            migrations,
            repository,
        })
    }
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<SchemaRegistry>,
    resolver: Arc<PermissionResolver>,
    resources: Arc<ResourceManager>,
    pipeline: HookPipeline,
    migrations: MigrationCoordinator,
    repository: ContentRepository,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("key", &self.config.key)
            .field("generation", &self.registry.current_generation())
            .field("migrations", &self.migrations)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn builder(
        config: EngineConfig,
        registry: Arc<SchemaRegistry>,
        roles: Arc<dyn RoleStore>,
        storage: Arc<dyn Storage>,
    ) -> EngineBuilder {
        EngineBuilder {
            config,
            registry,
            roles,
            storage,
            hooks: Hooks::default(),
            bindings: Vec::new(),
            reloaders: Vec::new(),
            content_handler: true,
        }
    }

    /// Resolve one request.
    ///
    /// The schema snapshot is captured once on entry and used for the whole
    /// request. Order: before-hooks, permission check, handler, after-hooks,
    /// post-list observers.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`]; [`EngineError::kind`] classifies it.
    #[tracing::instrument(
        skip_all,
        fields(resource = %ctx.resource(), action = %ctx.action(), generation = tracing::field::Empty)
    )]
    pub async fn dispatch(&self, mut ctx: RequestContext) -> Result<ActionOutput, EngineError> {
        let schema = self.registry.snapshot();
        tracing::Span::current().record("generation", tracing::field::display(schema.generation()));
        let resource = schema.resolve(ctx.resource())?;

        let resolver = Arc::clone(&self.resolver);
        let resources = Arc::clone(&self.resources);
        let output = self
            .pipeline
            .run(&mut ctx, move |ctx| {
                Box::pin(async move {
                    let grant = resolver.resolve(&ctx.role_ids, resource.name(), ctx.action())?;
                    let handler = resources
                        .handler_for(resource.name(), ctx.action())
                        .ok_or_else(|| EngineError::HandlerMissing {
                            resource: resource.name().to_owned(),
                            action: ctx.action(),
                        })?;
                    tracing::debug!(role = ?grant.role_id, constrained = grant.constraint.is_some(), "Access granted");
                    let call = ActionCall {
                        ctx,
                        schema,
                        resource,
                        grant,
                    };
                    handler.handle(&call).await
                })
            })
            .await?;
        tracing::debug!("Dispatched");
        Ok(output)
    }

    /// Validate and apply a schema migration.
    ///
    /// # Errors
    ///
    /// [`EngineError::Migration`] with `Busy` or `ValidationFailed`.
    pub async fn migrate(&self, pending: PendingMigration) -> Result<MigrationReport, EngineError> {
        Ok(self.migrations.apply(pending).await?)
    }

    #[must_use]
    pub fn migration_state(&self) -> MigrationState {
        self.migrations.state()
    }

    #[must_use]
    pub fn current_generation(&self) -> SchemaGeneration {
        self.registry.current_generation()
    }

    #[must_use]
    pub fn schema(&self) -> Arc<Schema> {
        self.registry.snapshot()
    }

    /// # Errors
    ///
    /// [`EngineError::NotFound`] for an unknown resource.
    pub fn resource_detail(&self, name: &str) -> Result<Arc<Resource>, EngineError> {
        Ok(self.registry.resolve(name)?)
    }

    /// Rebuild the permission cache from the role store.
    pub fn update_cache(&self) {
        self.resolver.refresh_for(&self.registry.snapshot());
    }

    #[must_use]
    pub fn roles(&self) -> Vec<Arc<Role>> {
        self.resolver.roles()
    }

    #[must_use]
    pub fn roles_from_ids(&self, ids: &[RoleId]) -> Vec<Arc<Role>> {
        self.resolver.roles_from_ids(ids)
    }

    #[must_use]
    pub fn role_detail(&self, id: RoleId) -> Option<Arc<Role>> {
        self.resolver.role_detail(id)
    }

    #[must_use]
    pub fn role_permission(&self, id: RoleId, resource: &str, action: Action) -> Option<Permission> {
        self.resolver.role_permission(id, resource, action)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.config.key
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Direct repository access for code that runs outside the pipeline
    /// (seeding, background jobs). No hooks or permission checks apply.
    #[must_use]
    pub fn repository(&self) -> &ContentRepository {
        &self.repository
    }
}
