//! Schema-aware construction of query and mutation descriptors.
//!
//! Every predicate, projection and payload entry is checked against the
//! resolved [`Resource`] before a descriptor exists, so nothing semantically
//! invalid can reach a storage backend.

use std::sync::Arc;

use contentkit_schema::{Field, FieldType, ID_FIELD, Record, Resource, Schema, Value};

use crate::descriptor::{MutationDescriptor, MutationKind, QueryDescriptor, QueryOptions};
use crate::error::TranslateError;
use crate::filter::Filter;

pub const DEFAULT_LIST_LIMIT: usize = 20;
pub const MAX_LIST_LIMIT: usize = 100;

/// Builds descriptors against a schema snapshot.
#[derive(Clone, Copy, Debug)]
pub struct Translator {
    default_limit: usize,
    max_limit: usize,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)
    }
}

impl Translator {
    #[must_use]
    pub fn new(default_limit: usize, max_limit: usize) -> Self {
        Self {
            default_limit,
            max_limit: max_limit.max(1),
        }
    }

    /// Build a read descriptor.
    ///
    /// Missing `limit` falls back to the default; larger limits are clamped.
    ///
    /// # Errors
    ///
    /// - [`TranslateError::UnknownResource`] if `resource` is not in `schema`
    /// - [`TranslateError::InvalidPredicate`] for unknown fields, operators
    ///   that do not fit the field type, or incompatible values (this covers
    ///   `select` and `sort` entries too)
    pub fn build_query(
        &self,
        schema: &Schema,
        resource: &str,
        filter: Option<Filter>,
        mut options: QueryOptions,
    ) -> Result<QueryDescriptor, TranslateError> {
        let resource = resolve(schema, resource)?;
        if let Some(filter) = &filter {
            validate_filter(&resource, filter)?;
        }
        for name in &options.select {
            field_of(&resource, name)?;
        }
        for sort in &options.sort {
            let field = field_of(&resource, &sort.field)?;
            if field.is_relation() || matches!(field.field_type, FieldType::Json) {
                return Err(TranslateError::predicate(
                    &sort.field,
                    format!("cannot sort by {} field", field.field_type.name()),
                ));
            }
        }
        let limit = options.limit.unwrap_or(self.default_limit).min(self.max_limit);
        options.limit = Some(limit);

        tracing::trace!(resource = resource.name(), limit, "Query descriptor built");
        Ok(QueryDescriptor::new(resource, filter, options))
    }

    /// Exactly-one lookup. Validated like [`Self::build_query`], but always
    /// fetches two rows so an ambiguous filter is visible whatever
    /// `max_limit` is.
    pub(crate) fn build_exact(
        schema: &Schema,
        resource: &str,
        filter: Filter,
    ) -> Result<QueryDescriptor, TranslateError> {
        let resource = resolve(schema, resource)?;
        validate_filter(&resource, &filter)?;
        Ok(QueryDescriptor::new(
            resource,
            Some(filter),
            QueryOptions::new().limit(2),
        ))
    }

    /// Existence lookup for check-then-act; `filter` is already validated.
    pub(crate) fn build_lookup(resource: &Arc<Resource>, filter: Filter) -> QueryDescriptor {
        QueryDescriptor::new(
            Arc::clone(resource),
            Some(filter),
            QueryOptions::new().limit(1),
        )
    }

    /// Build a write descriptor.
    ///
    /// Create payloads get declared defaults filled in. Update, bulk update,
    /// delete and bulk delete must carry a target; a vacuous target (see
    /// [`Filter::is_vacuous`]) counts as none.
    ///
    /// # Errors
    ///
    /// - [`TranslateError::UnknownResource`] if `resource` is not in `schema`
    /// - [`TranslateError::UnboundedScope`] when a target is required but absent
    /// - [`TranslateError::InvalidPredicate`] for an invalid target
    /// - [`TranslateError::InvalidPayload`] for unknown, read-only, mistyped or
    ///   missing required fields, or an empty update
    pub fn build_mutation(
        &self,
        schema: &Schema,
        resource: &str,
        kind: MutationKind,
        payload: Record,
        target: Option<Filter>,
    ) -> Result<MutationDescriptor, TranslateError> {
        let resource = resolve(schema, resource)?;
        let target = target.filter(|t| !(kind.requires_target() && t.is_vacuous()));

        match (&target, kind.requires_target()) {
            (None, true) => {
                return Err(TranslateError::UnboundedScope {
                    resource: resource.name().to_owned(),
                    kind,
                });
            }
            (Some(_), false) => {
                return Err(TranslateError::predicate(
                    "target",
                    format!("{kind} does not take a target"),
                ));
            }
            (Some(filter), true) => validate_filter(&resource, filter)?,
            (None, false) => {}
        }

        let payload = if kind.carries_payload() {
            validate_payload(&resource, kind, payload)?
        } else {
            Record::new()
        };

        tracing::trace!(resource = resource.name(), %kind, "Mutation descriptor built");
        Ok(MutationDescriptor::new(resource, kind, payload, target))
    }
}

fn resolve(schema: &Schema, name: &str) -> Result<Arc<Resource>, TranslateError> {
    schema
        .resolve(name)
        .map_err(|_| TranslateError::UnknownResource {
            resource: name.to_owned(),
        })
}

fn field_of<'r>(resource: &'r Resource, name: &str) -> Result<&'r Field, TranslateError> {
    resource.field(name).ok_or_else(|| {
        TranslateError::predicate(name, format!("unknown field on '{}'", resource.name()))
    })
}

/// Check a predicate tree against `resource`.
///
/// # Errors
///
/// Returns [`TranslateError::InvalidPredicate`] for the first offending node.
pub fn validate_filter(resource: &Resource, filter: &Filter) -> Result<(), TranslateError> {
    match filter {
        Filter::Compare(c) => {
            let field = comparable_field(resource, &c.field)?;
            if c.value.is_null() {
                return Err(TranslateError::predicate(
                    &c.field,
                    "null operand; use is_null / not_null",
                ));
            }
            if c.op.is_range() && !field.is_orderable() {
                return Err(TranslateError::predicate(
                    &c.field,
                    format!(
                        "operator '{}' needs an orderable field, got {}",
                        c.op.symbol(),
                        field.field_type.name()
                    ),
                ));
            }
            check_operand(field, &c.value)
        }
        Filter::In(m) => {
            let field = comparable_field(resource, &m.field)?;
            if m.values.is_empty() {
                return Err(TranslateError::predicate(&m.field, "empty value list"));
            }
            m.values.iter().try_for_each(|v| {
                if v.is_null() {
                    Err(TranslateError::predicate(&m.field, "null in value list"))
                } else {
                    check_operand(field, v)
                }
            })
        }
        Filter::Like(p) => {
            let field = field_of(resource, &p.field)?;
            if field.is_textual() {
                Ok(())
            } else {
                Err(TranslateError::predicate(
                    &p.field,
                    format!("pattern match on {} field", field.field_type.name()),
                ))
            }
        }
        Filter::Null(n) => field_of(resource, &n.field).map(drop),
        Filter::And(filters) | Filter::Or(filters) => filters
            .iter()
            .try_for_each(|f| validate_filter(resource, f)),
        Filter::Not(inner) => validate_filter(resource, inner),
    }
}

fn comparable_field<'r>(resource: &'r Resource, name: &str) -> Result<&'r Field, TranslateError> {
    let field = field_of(resource, name)?;
    match field.field_type {
        FieldType::Relation(_) => Err(TranslateError::predicate(
            name,
            "relation fields cannot be compared with scalar values",
        )),
        FieldType::Json => Err(TranslateError::predicate(
            name,
            "json fields only support null checks",
        )),
        _ => Ok(field),
    }
}

fn check_operand(field: &Field, value: &Value) -> Result<(), TranslateError> {
    if field.accepts(value) {
        Ok(())
    } else {
        Err(TranslateError::predicate(
            &field.name,
            format!(
                "{} value is not compatible with {} field",
                value.type_name(),
                field.field_type.name()
            ),
        ))
    }
}

fn validate_payload(
    resource: &Resource,
    kind: MutationKind,
    mut payload: Record,
) -> Result<Record, TranslateError> {
    for (name, value) in &payload {
        if name == ID_FIELD {
            return Err(TranslateError::payload(name, "assigned by storage"));
        }
        let field = resource.field(name).ok_or_else(|| {
            TranslateError::payload(name, format!("unknown field on '{}'", resource.name()))
        })?;
        if !field.accepts(value) {
            return Err(TranslateError::payload(
                name,
                format!(
                    "expected {}{}, got {}",
                    field.field_type.name(),
                    if field.optional { " or null" } else { "" },
                    value.type_name()
                ),
            ));
        }
    }

    if kind == MutationKind::Create {
        for field in resource.fields().iter().filter(|f| f.name != ID_FIELD) {
            if payload.contains_key(&field.name) {
                continue;
            }
            if let Some(default) = &field.default {
                payload.insert(field.name.clone(), default.clone());
            } else if !field.optional {
                return Err(TranslateError::payload(&field.name, "required"));
            }
        }
    } else if payload.is_empty() {
        return Err(TranslateError::payload("payload", "nothing to update"));
    }

    Ok(payload)
}
