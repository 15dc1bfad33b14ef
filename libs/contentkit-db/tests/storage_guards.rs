//! Rejections and existence checks must happen before storage sees a write.

use std::sync::Arc;

use async_trait::async_trait;
use contentkit_db::{
    ContentRepository, Filter, MemoryStorage, MutationDescriptor, MutationKind, MutationOutcome,
    QueryDescriptor, QueryOptions, RepositoryError, Storage, StorageError, TranslateError,
    Translator,
};
use contentkit_schema::{Field, Record, ResourceDef, Schema, SchemaGeneration, Value};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Wraps the memory backend and records every call it receives.
#[derive(Default)]
struct Recording {
    inner: MemoryStorage,
    calls: Mutex<Vec<String>>,
}

impl Recording {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn mutations(&self) -> usize {
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

fn post_schema() -> Schema {
    Schema::build(
        SchemaGeneration::INITIAL,
        vec![
            ResourceDef::new("post")
                .field(Field::string("title"))
                .field(Field::uint("authorId")),
        ],
    )
    .unwrap()
}

fn fixture() -> (Schema, Arc<Recording>, ContentRepository) {
    let schema = post_schema();
    let storage = Arc::new(Recording::default());
    storage.inner.sync_schema(&schema);
    let repo = ContentRepository::new(storage.clone(), Translator::default());
    (schema, storage, repo)
}

#[tokio::test]
async fn invalid_predicate_never_reaches_storage() {
    let (schema, storage, repo) = fixture();
    let cancel = CancellationToken::new();

    let err = repo
        .list(
            &schema,
            "post",
            Some(Filter::eq("title", "x").and(Filter::eq("missing", 1u64))),
            QueryOptions::new(),
            &cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Translate(TranslateError::InvalidPredicate { ref field, .. }) if field == "missing"
    ));

    let err = repo
        .delete_one(&schema, "post", Filter::gt("title", 3u64), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Translate(_)));
    assert!(storage.calls().is_empty());
}

#[tokio::test]
async fn untargeted_bulk_writes_are_unbounded() {
    let (schema, storage, repo) = fixture();
    storage
        .inner
        .seed(
            "post",
            [Record::from([
                ("title".to_owned(), Value::from("keep")),
                ("authorId".to_owned(), Value::Uint(1)),
            ])],
        )
        .unwrap();
    let cancel = CancellationToken::new();

    let err = repo
        .bulk_delete(&schema, "post", None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Translate(TranslateError::UnboundedScope {
            kind: MutationKind::BulkDelete,
            ..
        })
    ));

    let patch = Record::from([("title".to_owned(), Value::from("gone"))]);
    let err = repo
        .bulk_update(&schema, "post", None, patch, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Translate(TranslateError::UnboundedScope {
            kind: MutationKind::BulkUpdate,
            ..
        })
    ));

    assert!(storage.calls().is_empty());
    assert_eq!(storage.inner.rows("post").len(), 1);
}

#[tokio::test]
async fn deleting_missing_post_issues_no_mutation() {
    let (schema, storage, repo) = fixture();
    let err = repo
        .delete_one(&schema, "post", Filter::eq("id", 5u64), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { ref resource } if resource == "post"));
    assert_eq!(storage.calls(), ["find_one:post"]);
    assert_eq!(storage.mutations(), 0);
}

#[tokio::test]
async fn delete_of_existing_post_is_pinned_to_its_id() {
    let (schema, storage, repo) = fixture();
    storage
        .inner
        .seed(
            "post",
            (1..=3).map(|n| {
                Record::from([
                    ("title".to_owned(), Value::from(format!("p{n}"))),
                    ("authorId".to_owned(), Value::Uint(9)),
                ])
            }),
        )
        .unwrap();

    let removed = repo
        .delete_one(&schema, "post", Filter::eq("authorId", 9u64), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(removed.get("id"), Some(&Value::Uint(1)));
    assert_eq!(storage.calls(), ["find_one:post", "mutate:post:delete"]);
    assert_eq!(storage.inner.rows("post").len(), 2);
}

#[tokio::test]
async fn empty_predicate_trees_do_not_bound_bulk_writes() {
    let (schema, storage, repo) = fixture();
    storage
        .inner
        .seed(
            "post",
            (1..=3).map(|n| {
                Record::from([
                    ("title".to_owned(), Value::from(format!("p{n}"))),
                    ("authorId".to_owned(), Value::Uint(n)),
                ])
            }),
        )
        .unwrap();
    let cancel = CancellationToken::new();

    for target in [
        Filter::all(Vec::<Filter>::new()),
        Filter::And(vec![Filter::Or(vec![]), Filter::And(vec![])]),
        Filter::eq("authorId", 1u64).or(Filter::And(vec![])),
    ] {
        let err = repo
            .bulk_delete(&schema, "post", Some(target.clone()), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Translate(TranslateError::UnboundedScope { .. })
        ));

        let patch = Record::from([("title".to_owned(), Value::from("gone"))]);
        let err = repo
            .bulk_update(&schema, "post", Some(target.clone()), patch, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Translate(TranslateError::UnboundedScope { .. })
        ));

        let err = repo
            .delete_one(&schema, "post", target, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Translate(TranslateError::UnboundedScope { .. })
        ));
    }

    assert!(storage.calls().is_empty());
    assert_eq!(storage.inner.rows("post").len(), 3);
}

/// Hands back lookup rows with their `id` stripped.
#[derive(Default)]
struct Anonymous {
    inner: Recording,
}

#[async_trait]
impl Storage for Anonymous {
    async fn query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, StorageError> {
        self.inner.query(query).await
    }

    async fn find_one(&self, query: &QueryDescriptor) -> Result<Option<Record>, StorageError> {
        let mut row = self.inner.find_one(query).await?;
        if let Some(row) = row.as_mut() {
            row.remove("id");
        }
        Ok(row)
    }

    async fn mutate(&self, mutation: &MutationDescriptor) -> Result<MutationOutcome, StorageError> {
        self.inner.mutate(mutation).await
    }
}

#[tokio::test]
async fn single_entity_write_without_row_id_is_not_widened() {
    let schema = post_schema();
    let storage = Arc::new(Anonymous::default());
    storage.inner.inner.sync_schema(&schema);
    storage
        .inner
        .inner
        .seed(
            "post",
            (1..=2).map(|n| {
                Record::from([
                    ("title".to_owned(), Value::from(format!("p{n}"))),
                    ("authorId".to_owned(), Value::Uint(9)),
                ])
            }),
        )
        .unwrap();
    let repo = ContentRepository::new(storage.clone(), Translator::default());

    let err = repo
        .delete_one(&schema, "post", Filter::eq("authorId", 9u64), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::Storage(StorageError::MissingId(ref resource)) if resource == "post"
    ));
    assert_eq!(storage.inner.calls(), ["find_one:post"]);
    assert_eq!(storage.inner.inner.rows("post").len(), 2);
}
