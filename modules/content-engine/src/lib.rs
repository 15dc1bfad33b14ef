#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Content engine.
//!
//! Wires the ContentKit libraries into one request path:
//!
//! ```text
//! RequestContext -> before hooks -> permission check -> handler -> after hooks -> list observers
//! ```
//!
//! The schema snapshot is captured once per request; migrations swap it
//! atomically for later requests.

pub mod config;
pub mod domain;
pub mod engine;

pub use config::EngineConfig;
pub use domain::context::{ActionOutput, RequestContext, Target};
pub use domain::error::{EngineError, ErrorKind};
pub use domain::hooks::{
    ActionFuture, CANCELLED_AFTER_COMMIT, HookError, HookPipeline, Hooks, ListObserver, ResolveHook,
};
pub use domain::migration::{
    Migration, MigrationCoordinator, MigrationError, MigrationReport, MigrationState,
    PendingMigration, Reload, ReloadFailure,
};
pub use domain::resources::{
    ActionCall, ActionHandler, ContentHandler, ResourceBinding, ResourceManager,
};
pub use engine::{Engine, EngineBuilder};
