//! In-memory reference storage.
//!
//! Collections are keyed by resource name and must exist before they are
//! read or written ([`MemoryStorage::for_schema`] / [`MemoryStorage::sync_schema`]).
//! Ids auto-increment per collection starting at 1.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use contentkit_schema::{ID_FIELD, Record, Resource, Schema, Value};
use parking_lot::RwLock;

use crate::descriptor::{
    MutationDescriptor, MutationKind, MutationOutcome, QueryDescriptor, SortDirection, SortField,
};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Default)]
struct Collection {
    last_id: u64,
    rows: BTreeMap<u64, Record>,
}

impl Collection {
    fn matching(&self, query: &QueryDescriptor) -> impl Iterator<Item = &Record> {
        self.rows
            .values()
            .filter(move |row| query.filter().is_none_or(|f| f.matches(row)))
    }

    fn matching_ids(&self, mutation: &MutationDescriptor) -> Vec<u64> {
        self.rows
            .iter()
            .filter(|(_, row)| mutation.target().is_none_or(|f| f.matches(row)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Reject writes that would duplicate a unique field value.
    fn check_unique(
        &self,
        resource: &Resource,
        payload: &Record,
        touched: &[u64],
    ) -> Result<(), StorageError> {
        for field in resource.fields().iter().filter(|f| f.unique) {
            let Some(value) = payload.get(&field.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = touched.len() > 1
                || self.rows.iter().any(|(id, row)| {
                    !touched.contains(id)
                        && row.get(&field.name).is_some_and(|v| v.loose_eq(value))
                });
            if clash {
                return Err(StorageError::Constraint(format!(
                    "duplicate value {value} for unique field '{}.{}'",
                    resource.name(),
                    field.name
                )));
            }
        }
        Ok(())
    }
}

/// Thread-safe in-memory [`Storage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage with one empty collection per resource of `schema`.
    #[must_use]
    pub fn for_schema(schema: &Schema) -> Self {
        let storage = Self::new();
        storage.sync_schema(schema);
        storage
    }

    /// Create collections for new resources and drop collections whose
    /// resource no longer exists. Existing rows are kept as they are.
    pub fn sync_schema(&self, schema: &Schema) {
        let mut collections = self.collections.write();
        collections.retain(|name, _| schema.contains(name));
        for name in schema.names() {
            collections.entry(name.to_owned()).or_default();
        }
        tracing::debug!(collections = collections.len(), "Memory storage synced");
    }

    /// Insert rows as-is, assigning ids. Returns the assigned ids.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownCollection`] if `resource` has no collection.
    pub fn seed(
        &self,
        resource: &str,
        rows: impl IntoIterator<Item = Record>,
    ) -> Result<Vec<u64>, StorageError> {
        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(resource)
            .ok_or_else(|| StorageError::UnknownCollection(resource.to_owned()))?;
        Ok(rows
            .into_iter()
            .map(|mut row| {
                collection.last_id += 1;
                let id = collection.last_id;
                row.insert(ID_FIELD.to_owned(), Value::Uint(id));
                collection.rows.insert(id, row);
                id
            })
            .collect())
    }

    /// Every stored row of `resource`, in id order.
    #[must_use]
    pub fn rows(&self, resource: &str) -> Vec<Record> {
        self.collections
            .read()
            .get(resource)
            .map(|c| c.rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn null_first(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn sort_rows(rows: &mut [Record], sort: &[SortField]) {
    rows.sort_by(|a, b| {
        sort.iter()
            .map(|s| {
                let ord = null_first(
                    a.get(&s.field).unwrap_or(&Value::Null),
                    b.get(&s.field).unwrap_or(&Value::Null),
                );
                match s.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}

fn project(mut row: Record, select: &[String]) -> Record {
    if !select.is_empty() {
        row.retain(|k, _| k == ID_FIELD || select.iter().any(|s| s == k));
    }
    row
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn query(&self, query: &QueryDescriptor) -> Result<Vec<Record>, StorageError> {
        let collections = self.collections.read();
        let name = query.resource().name();
        let collection = collections
            .get(name)
            .ok_or_else(|| StorageError::UnknownCollection(name.to_owned()))?;

        let mut rows: Vec<Record> = collection.matching(query).cloned().collect();
        let options = query.options();
        sort_rows(&mut rows, &options.sort);
        Ok(rows
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|row| project(row, &options.select))
            .collect())
    }

    async fn find_one(&self, query: &QueryDescriptor) -> Result<Option<Record>, StorageError> {
        let collections = self.collections.read();
        let name = query.resource().name();
        let collection = collections
            .get(name)
            .ok_or_else(|| StorageError::UnknownCollection(name.to_owned()))?;
        Ok(collection.matching(query).next().cloned())
    }

    async fn mutate(&self, mutation: &MutationDescriptor) -> Result<MutationOutcome, StorageError> {
        let mut collections = self.collections.write();
        let resource = mutation.resource();
        let collection = collections
            .get_mut(resource.name())
            .ok_or_else(|| StorageError::UnknownCollection(resource.name().to_owned()))?;

        let ids = match mutation.kind() {
            MutationKind::Create => {
                collection.check_unique(resource, mutation.payload(), &[])?;
                collection.last_id += 1;
                let id = collection.last_id;
                let mut row = mutation.payload().clone();
                row.insert(ID_FIELD.to_owned(), Value::Uint(id));
                collection.rows.insert(id, row);
                vec![id]
            }
            MutationKind::Update | MutationKind::BulkUpdate => {
                let ids = collection.matching_ids(mutation);
                collection.check_unique(resource, mutation.payload(), &ids)?;
                for id in &ids {
                    if let Some(row) = collection.rows.get_mut(id) {
                        row.extend(
                            mutation
                                .payload()
                                .iter()
                                .map(|(k, v)| (k.clone(), v.clone())),
                        );
                    }
                }
                ids
            }
            MutationKind::Delete | MutationKind::BulkDelete => {
                let ids = collection.matching_ids(mutation);
                for id in &ids {
                    collection.rows.remove(id);
                }
                ids
            }
        };

        tracing::trace!(
            resource = resource.name(),
            kind = %mutation.kind(),
            affected = ids.len(),
            "Memory mutation applied"
        );
        Ok(MutationOutcome {
            affected: ids.len() as u64,
            ids,
        })
    }
}
