use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::SchemaError;
use crate::resource::{Resource, ResourceDef};
use crate::schema::{Schema, SchemaGeneration};

/// Holds the current [`Schema`] snapshot.
///
/// Readers go through `ArcSwap` and never block. A request should call
/// [`SchemaRegistry::snapshot`] once and resolve everything against that
/// snapshot; calls already holding a snapshot keep it across a
/// [`SchemaRegistry::replace`].
pub struct SchemaRegistry {
    current: ArcSwap<Schema>,
    // Serializes writers around build + swap only; readers never take it.
    writer: Mutex<()>,
}

impl SchemaRegistry {
    /// Create a registry at [`SchemaGeneration::INITIAL`].
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if `defs` do not form a valid schema.
    pub fn new(defs: Vec<ResourceDef>) -> Result<Self, SchemaError> {
        let schema = Schema::build(SchemaGeneration::INITIAL, defs)?;
        Ok(Self {
            current: ArcSwap::from_pointee(schema),
            writer: Mutex::new(()),
        })
    }

    /// Capture the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Schema> {
        self.current.load_full()
    }

    #[must_use]
    pub fn current_generation(&self) -> SchemaGeneration {
        self.current.load().generation()
    }

    /// Resolve a resource against the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] for unknown names.
    pub fn resolve(&self, name: &str) -> Result<Arc<Resource>, SchemaError> {
        self.current.load().resolve(name)
    }

    /// Dry-run: check that `defs` would be accepted by [`Self::replace`].
    ///
    /// # Errors
    ///
    /// Returns the validation error `replace` would return.
    pub fn validate(&self, defs: Vec<ResourceDef>) -> Result<(), SchemaError> {
        let generation = self.current_generation().next();
        Schema::build(generation, defs).map(drop)
    }

    /// Swap in a new schema built from `defs`.
    ///
    /// The next generation is fully built and validated before the swap; on
    /// error the previous snapshot stays authoritative and untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if `defs` do not form a valid schema.
    pub fn replace(&self, defs: Vec<ResourceDef>) -> Result<Arc<Schema>, SchemaError> {
        let _guard = self.writer.lock();
        let generation = self.current.load().generation().next();
        let next = Arc::new(Schema::build(generation, defs)?);
        self.current.store(Arc::clone(&next));
        tracing::info!(generation = %generation, resources = next.len(), "Schema replaced");
        Ok(next)
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schema = self.current.load();
        f.debug_struct("SchemaRegistry")
            .field("generation", &schema.generation())
            .field("resources", &schema.len())
            .finish_non_exhaustive()
    }
}
