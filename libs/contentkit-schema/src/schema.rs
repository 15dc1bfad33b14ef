use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::field::FieldType;
use crate::resource::{ID_FIELD, Resource, ResourceDef};

/// Opaque schema version token. Strictly increases on every successful swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaGeneration(u64);

impl SchemaGeneration {
    pub const INITIAL: Self = Self(1);

    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SchemaGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// One immutable, internally consistent set of resources.
#[derive(Debug)]
pub struct Schema {
    generation: SchemaGeneration,
    resources: BTreeMap<String, Arc<Resource>>,
}

impl Schema {
    /// Validate `defs` and build the snapshot for `generation`.
    ///
    /// Nothing is registered unless the whole set validates.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found: bad names, duplicate resources
    /// or fields, a redeclared `id`, empty enums, defaults that do not fit
    /// their field, or relations whose target is not in `defs`.
    pub fn build(generation: SchemaGeneration, defs: Vec<ResourceDef>) -> Result<Self, SchemaError> {
        let mut names = HashSet::with_capacity(defs.len());
        for def in &defs {
            validate_name(&def.name)?;
            if !names.insert(def.name.as_str()) {
                return Err(SchemaError::DuplicateResource(def.name.clone()));
            }
        }

        for def in &defs {
            validate_fields(def, &names)?;
        }

        let resources = defs
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(Resource::from_validated(def))))
            .collect();

        Ok(Self {
            generation,
            resources,
        })
    }

    #[must_use]
    pub fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&Arc<Resource>> {
        self.resources.get(name)
    }

    /// Resolve a resource name within this snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::NotFound`] when the name is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<Resource>, SchemaError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::not_found(name))
    }

    pub fn resources(&self) -> impl Iterator<Item = &Arc<Resource>> {
        self.resources.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The definitions this snapshot was built from, in name order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ResourceDef> {
        self.resources
            .values()
            .map(|r| r.definition().clone())
            .collect()
    }
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    let invalid = |reason| SchemaError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(c) if !c.is_ascii_alphabetic() && c != '_' => {
            return Err(invalid("must start with a letter or underscore"));
        }
        Some(_) => {}
    }
    if chars.any(|c| !c.is_ascii_alphanumeric() && c != '_') {
        return Err(invalid("only ascii letters, digits and underscores are allowed"));
    }
    Ok(())
}

fn validate_fields(def: &ResourceDef, resources: &HashSet<&str>) -> Result<(), SchemaError> {
    let mut seen = HashSet::with_capacity(def.fields.len());
    for field in &def.fields {
        validate_name(&field.name)?;
        if field.name == ID_FIELD {
            return Err(SchemaError::ReservedField {
                resource: def.name.clone(),
                field: field.name.clone(),
            });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                resource: def.name.clone(),
                field: field.name.clone(),
            });
        }
        match &field.field_type {
            FieldType::Enum { values } if values.is_empty() => {
                return Err(SchemaError::EmptyEnum {
                    resource: def.name.clone(),
                    field: field.name.clone(),
                });
            }
            FieldType::Relation(rel) if !resources.contains(rel.target.as_str()) => {
                return Err(SchemaError::UnresolvedRelation {
                    resource: def.name.clone(),
                    field: field.name.clone(),
                    target: rel.target.clone(),
                });
            }
            _ => {}
        }
        if let Some(default) = &field.default
            && !field.accepts(default)
        {
            return Err(SchemaError::InvalidDefault {
                resource: def.name.clone(),
                field: field.name.clone(),
            });
        }
    }
    Ok(())
}

/// Resource-level difference between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Same name, different definition.
    pub altered: Vec<String>,
}

impl SchemaDiff {
    #[must_use]
    pub fn between(old: &Schema, new: &Schema) -> Self {
        let mut diff = Self::default();
        for (name, resource) in &new.resources {
            match old.resources.get(name) {
                None => diff.added.push(name.clone()),
                Some(prev) if prev.definition() != resource.definition() => {
                    diff.altered.push(name.clone());
                }
                Some(_) => {}
            }
        }
        diff.removed = old
            .resources
            .keys()
            .filter(|name| !new.resources.contains_key(*name))
            .cloned()
            .collect();
        diff
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.altered.is_empty()
    }
}
