//! Executes translated descriptors against a [`Storage`].
//!
//! This is the only place that calls storage. Every call is raced against the
//! caller's [`CancellationToken`]; a cancelled call drops the storage future
//! and returns [`RepositoryError::Cancelled`]. Nothing is retried.

use std::future::Future;
use std::sync::Arc;

use contentkit_schema::{ID_FIELD, Record, Schema, Value};
use tokio_util::sync::CancellationToken;

use crate::descriptor::{MutationDescriptor, MutationKind, MutationOutcome, QueryOptions};
use crate::error::RepositoryError;
use crate::filter::Filter;
use crate::storage::{Storage, StorageError};
use crate::translator::Translator;

#[derive(Clone)]
pub struct ContentRepository {
    storage: Arc<dyn Storage>,
    translator: Translator,
}

impl std::fmt::Debug for ContentRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRepository")
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}

async fn guarded<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, RepositoryError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RepositoryError::Cancelled),
        res = call => res.map_err(RepositoryError::from),
    }
}

impl ContentRepository {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, translator: Translator) -> Self {
        Self {
            storage,
            translator,
        }
    }

    #[must_use]
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// List rows of `resource`.
    ///
    /// # Errors
    ///
    /// Translation errors, storage failures, or cancellation.
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn list(
        &self,
        schema: &Schema,
        resource: &str,
        filter: Option<Filter>,
        options: QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>, RepositoryError> {
        let query = self
            .translator
            .build_query(schema, resource, filter, options)?;
        let rows = guarded(cancel, self.storage.query(&query)).await?;
        tracing::debug!(rows = rows.len(), "Listed");
        Ok(rows)
    }

    /// Exactly-one lookup.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] for no match and
    /// [`RepositoryError::NotUnique`] for more than one; otherwise as [`Self::list`].
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn only(
        &self,
        schema: &Schema,
        resource: &str,
        filter: Filter,
        cancel: &CancellationToken,
    ) -> Result<Record, RepositoryError> {
        let query = Translator::build_exact(schema, resource, filter)?;
        let mut rows = guarded(cancel, self.storage.query(&query)).await?;
        match rows.len() {
            0 => Err(RepositoryError::not_found(resource)),
            1 => Ok(rows.remove(0)),
            _ => Err(RepositoryError::NotUnique {
                resource: resource.to_owned(),
            }),
        }
    }

    /// Create one entity and return the stored row.
    ///
    /// # Errors
    ///
    /// Payload validation errors, storage failures, or cancellation.
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn create(
        &self,
        schema: &Schema,
        resource: &str,
        payload: Record,
        cancel: &CancellationToken,
    ) -> Result<Record, RepositoryError> {
        let mutation =
            self.translator
                .build_mutation(schema, resource, MutationKind::Create, payload, None)?;
        let outcome = guarded(cancel, self.storage.mutate(&mutation)).await?;
        let Some(&id) = outcome.ids.first() else {
            return Ok(mutation.payload().clone());
        };
        tracing::debug!(id, "Created");
        self.reload_row(&mutation, id, cancel)
            .await
            .map(|row| {
                row.unwrap_or_else(|| {
                    let mut row = mutation.payload().clone();
                    row.insert(ID_FIELD.to_owned(), Value::Uint(id));
                    row
                })
            })
    }

    /// Update the single entity selected by `target` and return it.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if nothing matches (no write is issued);
    /// otherwise as [`Self::create`].
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn update_one(
        &self,
        schema: &Schema,
        resource: &str,
        target: Filter,
        payload: Record,
        cancel: &CancellationToken,
    ) -> Result<Record, RepositoryError> {
        let mutation = self.translator.build_mutation(
            schema,
            resource,
            MutationKind::Update,
            payload,
            Some(target),
        )?;
        let (found, id, _) = self.check_then_act(&mutation, cancel).await?;
        Ok(self.reload_row(&mutation, id, cancel).await?.unwrap_or(found))
    }

    /// Delete the single entity selected by `target`; returns the row as it
    /// was before deletion.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::NotFound`] if nothing matches (no write is issued);
    /// otherwise as [`Self::create`].
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn delete_one(
        &self,
        schema: &Schema,
        resource: &str,
        target: Filter,
        cancel: &CancellationToken,
    ) -> Result<Record, RepositoryError> {
        let mutation = self.translator.build_mutation(
            schema,
            resource,
            MutationKind::Delete,
            Record::new(),
            Some(target),
        )?;
        let (found, ..) = self.check_then_act(&mutation, cancel).await?;
        Ok(found)
    }

    /// # Errors
    ///
    /// [`crate::TranslateError::UnboundedScope`] without a target, otherwise
    /// as [`Self::create`].
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn bulk_update(
        &self,
        schema: &Schema,
        resource: &str,
        target: Option<Filter>,
        payload: Record,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, RepositoryError> {
        let mutation = self.translator.build_mutation(
            schema,
            resource,
            MutationKind::BulkUpdate,
            payload,
            target,
        )?;
        self.execute(&mutation, cancel).await
    }

    /// # Errors
    ///
    /// [`crate::TranslateError::UnboundedScope`] without a target, otherwise
    /// as [`Self::create`].
    #[tracing::instrument(skip_all, fields(resource = %resource, generation = %schema.generation()))]
    pub async fn bulk_delete(
        &self,
        schema: &Schema,
        resource: &str,
        target: Option<Filter>,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, RepositoryError> {
        let mutation = self.translator.build_mutation(
            schema,
            resource,
            MutationKind::BulkDelete,
            Record::new(),
            target,
        )?;
        self.execute(&mutation, cancel).await
    }

    /// Run an already-built mutation. Single-entity kinds go through the
    /// existence check first.
    ///
    /// # Errors
    ///
    /// Storage failures, [`RepositoryError::NotFound`] or cancellation.
    pub async fn execute(
        &self,
        mutation: &MutationDescriptor,
        cancel: &CancellationToken,
    ) -> Result<MutationOutcome, RepositoryError> {
        if mutation.kind().is_single_entity() {
            return self
                .check_then_act(mutation, cancel)
                .await
                .map(|(.., outcome)| outcome);
        }
        let outcome = guarded(cancel, self.storage.mutate(mutation)).await?;
        tracing::debug!(kind = %mutation.kind(), affected = outcome.affected, "Mutation applied");
        Ok(outcome)
    }

    /// Look the target up, then issue the mutation pinned to the found id.
    /// A found row without an id is a backend fault; the write is not issued.
    async fn check_then_act(
        &self,
        mutation: &MutationDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(Record, u64, MutationOutcome), RepositoryError> {
        let resource = mutation.resource();
        let Some(target) = mutation.target() else {
            return Err(crate::TranslateError::UnboundedScope {
                resource: resource.name().to_owned(),
                kind: mutation.kind(),
            }
            .into());
        };
        let lookup = Translator::build_lookup(resource, target.clone());
        let Some(found) = guarded(cancel, self.storage.find_one(&lookup)).await? else {
            tracing::debug!(kind = %mutation.kind(), "Target not found, no mutation issued");
            return Err(RepositoryError::not_found(resource.name()));
        };

        let Some(id) = found.get(ID_FIELD).and_then(Value::as_u64) else {
            tracing::warn!(kind = %mutation.kind(), "Target row has no id, no mutation issued");
            return Err(StorageError::MissingId(resource.name().to_owned()).into());
        };
        let pinned = mutation.with_target(Filter::eq(ID_FIELD, id));
        let outcome = guarded(cancel, self.storage.mutate(&pinned)).await?;
        tracing::debug!(kind = %mutation.kind(), id, affected = outcome.affected, "Mutation applied");
        Ok((found, id, outcome))
    }

    /// Re-read a row after its write committed. Cancellation at this point
    /// yields `None` so the committed result is still returned.
    async fn reload_row(
        &self,
        mutation: &MutationDescriptor,
        id: u64,
        cancel: &CancellationToken,
    ) -> Result<Option<Record>, RepositoryError> {
        let lookup = Translator::build_lookup(mutation.resource(), Filter::eq(ID_FIELD, id));
        match guarded(cancel, self.storage.find_one(&lookup)).await {
            Err(RepositoryError::Cancelled) => {
                tracing::debug!(id, "Cancelled after commit, re-read skipped");
                Ok(None)
            }
            other => other,
        }
    }
}
