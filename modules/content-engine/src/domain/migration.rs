//! Single-flight schema migrations.
//!
//! A migration validates the complete next resource set, swaps the registry
//! snapshot, refreshes the permission cache and then notifies reloaders.
//! Only one migration runs at a time; a concurrent attempt fails fast with
//! [`MigrationError::Busy`] instead of queueing.

use std::sync::Arc;

use async_trait::async_trait;
use contentkit_schema::{
    ResourceDef, Schema, SchemaDiff, SchemaError, SchemaGeneration, SchemaRegistry,
};
use contentkit_security::PermissionResolver;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("another migration is in progress")]
    Busy,

    /// The next schema was rejected; the current generation is untouched.
    #[error("migration rejected: {0}")]
    ValidationFailed(#[source] SchemaError),
}

/// Where the coordinator is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MigrationState {
    #[default]
    Idle,
    Validating,
    Swapping,
    Failed,
}

/// A requested schema change: the full next resource set.
#[derive(Clone, Debug, Default)]
pub struct PendingMigration {
    pub resources: Vec<ResourceDef>,
    pub description: Option<String>,
}

impl PendingMigration {
    #[must_use]
    pub fn new(resources: Vec<ResourceDef>) -> Self {
        Self {
            resources,
            description: None,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An applied migration, as handed to reloaders.
#[derive(Clone, Debug)]
pub struct Migration {
    pub from: SchemaGeneration,
    pub to: SchemaGeneration,
    pub diff: SchemaDiff,
    pub schema: Arc<Schema>,
    pub description: Option<String>,
}

/// Post-swap hook for components that cache schema-derived state.
#[async_trait]
pub trait Reload: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Failures are reported in [`MigrationReport::reload_errors`]; the swap
    /// is never rolled back.
    async fn reload(&self, migration: &Migration) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadFailure {
    pub reloader: String,
    pub error: String,
}

#[derive(Clone, Debug)]
pub struct MigrationReport {
    pub migration: Migration,
    pub reload_errors: Vec<ReloadFailure>,
}

impl MigrationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.reload_errors.is_empty()
    }
}

/// Resets the observable state when a migration ends, however it ends.
struct StateReset<'a>(&'a Mutex<MigrationState>);

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        *self.0.lock() = MigrationState::Idle;
    }
}

pub struct MigrationCoordinator {
    registry: Arc<SchemaRegistry>,
    resolver: Arc<PermissionResolver>,
    reloaders: Vec<Arc<dyn Reload>>,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<MigrationState>,
}

impl std::fmt::Debug for MigrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationCoordinator")
            .field("state", &self.state())
            .field("generation", &self.registry.current_generation())
            .field("reloaders", &self.reloaders.len())
            .finish_non_exhaustive()
    }
}

impl MigrationCoordinator {
    #[must_use]
    pub fn new(registry: Arc<SchemaRegistry>, resolver: Arc<PermissionResolver>) -> Self {
        Self {
            registry,
            resolver,
            reloaders: Vec::new(),
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(MigrationState::Idle),
        }
    }

    /// Reloaders run in registration order after every successful swap.
    #[must_use]
    pub fn with_reloader(mut self, reloader: Arc<dyn Reload>) -> Self {
        self.reloaders.push(reloader);
        self
    }

    #[must_use]
    pub fn state(&self) -> MigrationState {
        *self.state.lock()
    }

    fn enter(&self, state: MigrationState) {
        *self.state.lock() = state;
    }

    fn reject(&self, error: SchemaError) -> MigrationError {
        self.enter(MigrationState::Failed);
        tracing::warn!(error = %error, "Migration rejected, schema unchanged");
        MigrationError::ValidationFailed(error)
    }

    /// Validate and apply `pending`.
    ///
    /// # Errors
    ///
    /// - [`MigrationError::Busy`] if another migration holds the gate
    /// - [`MigrationError::ValidationFailed`] if the next schema is invalid;
    ///   nothing was swapped
    #[tracing::instrument(skip_all, fields(from = %self.registry.current_generation()))]
    pub async fn apply(&self, pending: PendingMigration) -> Result<MigrationReport, MigrationError> {
        let Ok(_gate) = self.gate.try_lock() else {
            tracing::warn!("Migration refused, another one is in flight");
            return Err(MigrationError::Busy);
        };
        let _reset = StateReset(&self.state);

        self.enter(MigrationState::Validating);
        let previous = self.registry.snapshot();
        self.registry
            .validate(pending.resources.clone())
            .map_err(|e| self.reject(e))?;

        self.enter(MigrationState::Swapping);
        let schema = self
            .registry
            .replace(pending.resources)
            .map_err(|e| self.reject(e))?;
        self.resolver.refresh_for(&schema);

        let migration = Migration {
            from: previous.generation(),
            to: schema.generation(),
            diff: SchemaDiff::between(&previous, &schema),
            schema,
            description: pending.description,
        };

        let mut reload_errors = Vec::new();
        for reloader in &self.reloaders {
            if let Err(e) = reloader.reload(&migration).await {
                tracing::warn!(reloader = reloader.name(), error = %e, "Reload failed after migration");
                reload_errors.push(ReloadFailure {
                    reloader: reloader.name().to_owned(),
                    error: format!("{e:#}"),
                });
            }
        }

        tracing::info!(
            to = %migration.to,
            added = ?migration.diff.added,
            removed = ?migration.diff.removed,
            altered = ?migration.diff.altered,
            reload_errors = reload_errors.len(),
            "Migration applied"
        );
        Ok(MigrationReport {
            migration,
            reload_errors,
        })
    }
}
