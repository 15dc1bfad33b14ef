#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use content_engine::{Engine, EngineConfig, Hooks};
use contentkit_db::{
    MemoryStorage, MutationDescriptor, MutationOutcome, QueryDescriptor, Storage, StorageError,
};
use contentkit_schema::{Field, Record, ResourceDef, SchemaRegistry, Value};
use contentkit_security::{MemoryRoleStore, Role};
use parking_lot::Mutex;

/// Memory storage that records every call it receives.
#[derive(Default)]
pub struct Recording {
    pub inner: MemoryStorage,
    calls: Mutex<Vec<String>>,
}

impl Recording {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("mutate")).count()
    }
}

#[async_trait]
impl Storage for Recording {
    async fn query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, StorageError> {
        self.calls.lock().push(format!("query:{}", query.resource().name()));
        self.inner.query(query).await
    }

    async fn find_one(&self, query: &QueryDescriptor) -> Result<Option<Record>, StorageError> {
        self.calls.lock().push(format!("find_one:{}", query.resource().name()));
        self.inner.find_one(query).await
    }

    async fn mutate(&self, mutation: &MutationDescriptor) -> Result<MutationOutcome, StorageError> {
        self.calls
            .lock()
            .push(format!("mutate:{}:{}", mutation.resource().name(), mutation.kind()));
        self.inner.mutate(mutation).await
    }
}

pub fn post_def() -> ResourceDef {
    ResourceDef::new("post")
        .field(Field::string("title"))
        .field(Field::uint("authorId"))
}

pub fn post(title: &str, author: u64) -> Record {
    Record::from([
        ("title".to_owned(), Value::from(title)),
        ("authorId".to_owned(), Value::Uint(author)),
    ])
}

pub struct Fixture {
    pub engine: Engine,
    pub storage: Arc<Recording>,
    pub roles: Arc<MemoryRoleStore>,
    pub registry: Arc<SchemaRegistry>,
}

pub fn fixture(roles: impl IntoIterator<Item = Role>, hooks: Hooks) -> Fixture {
    let registry = Arc::new(SchemaRegistry::new(vec![post_def()]).unwrap());
    let storage = Arc::new(Recording::default());
    storage.inner.sync_schema(&registry.snapshot());
    let store = Arc::new(MemoryRoleStore::with_roles(roles).unwrap());
    let engine = Engine::builder(
        EngineConfig::default(),
        Arc::clone(&registry),
        store.clone(),
        storage.clone(),
    )
    .hooks(hooks)
    .build()
    .unwrap();
    Fixture {
        engine,
        storage,
        roles: store,
        registry,
    }
}
