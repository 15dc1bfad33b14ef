mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{Recording, post_def};
use content_engine::{
    Engine, EngineConfig, ErrorKind, Hooks, Migration, MigrationState, PendingMigration, Reload,
    RequestContext, ResourceBinding,
};
use contentkit_db::MemoryStorage;
use contentkit_schema::{Action, Field, ResourceDef, SchemaRegistry};
use contentkit_security::{MemoryRoleStore, Permission, PermissionScope, Role, RoleId};
use tokio::sync::Notify;

/// Parks inside `reload` until released.
#[derive(Default)]
struct Parked {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl Reload for Parked {
    async fn reload(&self, _migration: &Migration) -> anyhow::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

fn with_tags() -> PendingMigration {
    PendingMigration::new(vec![
        post_def(),
        ResourceDef::new("tag").field(Field::string("slug")),
    ])
}

#[tokio::test]
async fn rejected_migration_changes_nothing() {
    let f = common::fixture([Role::new(1, "admin").root()], Hooks::new());
    let before = f.engine.resource_detail("post").unwrap();

    let err = f
        .engine
        .migrate(PendingMigration::new(vec![
            post_def(),
            ResourceDef::new("comment").field(Field::relation(
                "post",
                "article",
                contentkit_schema::RelationKind::ManyToOne,
            )),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MigrationValidationFailed);
    assert_eq!(f.engine.current_generation().get(), 1);
    assert_eq!(f.engine.migration_state(), MigrationState::Idle);
    let after = f.engine.resource_detail("post").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(f.engine.resource_detail("comment").unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn concurrent_migration_is_busy_and_first_completes() {
    let registry = Arc::new(SchemaRegistry::new(vec![post_def()]).unwrap());
    let storage = Arc::new(MemoryStorage::for_schema(&registry.snapshot()));
    let parked = Arc::new(Parked::default());
    let engine = Arc::new(
        Engine::builder(
            EngineConfig::default(),
            registry,
            Arc::new(MemoryRoleStore::new()),
            storage,
        )
        .reloader(parked.clone())
        .build()
        .unwrap(),
    );

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.migrate(with_tags()).await }
    });
    parked.entered.notified().await;
    assert_eq!(engine.migration_state(), MigrationState::Swapping);

    let err = engine.migrate(with_tags()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);

    parked.release.notify_one();
    let report = first.await.unwrap().unwrap();
    assert!(report.is_clean());
    assert_eq!(report.migration.to.get(), 2);
    assert_eq!(engine.current_generation().get(), 2);
    assert_eq!(engine.migration_state(), MigrationState::Idle);
}

#[tokio::test]
async fn migrated_resources_are_served_with_refreshed_permissions() {
    let registry = Arc::new(SchemaRegistry::new(vec![post_def()]).unwrap());
    let storage = Arc::new(MemoryStorage::for_schema(&registry.snapshot()));
    let roles = Arc::new(
        MemoryRoleStore::with_roles([Role::new(1, "editor")
            .permit(Permission::allow(PermissionScope::Global, Action::Create))
            .permit(Permission::allow(PermissionScope::resource("tag"), Action::List))])
        .unwrap(),
    );
    let engine = Engine::builder(EngineConfig::default(), registry, roles, storage.clone())
        .reloader(storage.clone())
        .build()
        .unwrap();
    assert!(engine.role_permission(RoleId(1), "tag", Action::List).is_none());

    let report = engine.migrate(with_tags().describe("add tags")).await.unwrap();
    assert_eq!(report.migration.diff.added, ["tag"]);
    assert_eq!(report.migration.description.as_deref(), Some("add tags"));
    assert!(report.is_clean());
    assert!(engine.role_permission(RoleId(1), "tag", Action::List).is_some());

    let slug = contentkit_schema::Record::from([(
        "slug".to_owned(),
        contentkit_schema::Value::from("rust"),
    )]);
    engine
        .dispatch(
            RequestContext::new("tag", Action::Create)
                .with_roles([1u64])
                .with_payload(slug),
        )
        .await
        .unwrap();
    let out = engine
        .dispatch(RequestContext::new("tag", Action::List).with_roles([1u64]))
        .await
        .unwrap();
    assert_eq!(out.records().unwrap().len(), 1);
}

#[tokio::test]
async fn stale_bindings_are_reported_not_rolled_back() {
    struct Noop;

    #[async_trait]
    impl content_engine::ActionHandler for Noop {
        async fn handle(
            &self,
            _call: &content_engine::ActionCall<'_>,
        ) -> Result<content_engine::ActionOutput, content_engine::EngineError> {
            Ok(content_engine::ActionOutput::Records(Vec::new()))
        }
    }

    let registry = Arc::new(
        SchemaRegistry::new(vec![
            post_def(),
            ResourceDef::new("tag").field(Field::string("slug")),
        ])
        .unwrap(),
    );
    let storage = Arc::new(Recording::default());
    storage.inner.sync_schema(&registry.snapshot());
    let engine = Engine::builder(
        EngineConfig::default(),
        registry,
        Arc::new(MemoryRoleStore::new()),
        storage.clone(),
    )
    .resource(ResourceBinding::new("tag").handler(Action::List, Arc::new(Noop)))
    .build()
    .unwrap();

    let report = engine
        .migrate(PendingMigration::new(vec![post_def()]))
        .await
        .unwrap();
    assert_eq!(report.migration.diff.removed, ["tag"]);
    assert_eq!(report.reload_errors.len(), 1);
    assert_eq!(report.reload_errors[0].reloader, "resource-bindings");
    assert_eq!(engine.current_generation().get(), 2);
    assert!(storage.calls().is_empty());
}
