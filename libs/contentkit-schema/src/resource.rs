use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::field::Field;

/// Name of the system primary key every resource carries.
pub const ID_FIELD: &str = "id";

/// The closed set of actions a resource can be resolved for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Action {
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::List,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }

    /// Whether the action writes to storage.
    #[must_use]
    pub fn is_mutating(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownAction(s.to_owned()))
    }
}

/// Declarative definition of a resource, as produced by the schema source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ResourceDef {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
}

/// A registered resource.
///
/// Built only through [`crate::Schema::build`], so every instance has been
/// validated and carries the system `id` field first. Immutable; shared as
/// `Arc<Resource>` by the snapshot that owns it.
#[derive(Debug, PartialEq)]
pub struct Resource {
    def: ResourceDef,
    fields: Vec<Field>,
}

impl Resource {
    pub(crate) fn from_validated(def: ResourceDef) -> Self {
        let mut fields = Vec::with_capacity(def.fields.len() + 1);
        fields.push(Field::uint(ID_FIELD));
        fields.extend(def.fields.iter().cloned());
        Self { def, fields }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// All fields, starting with the system `id`.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_relation())
    }

    /// The definition this resource was registered from.
    #[must_use]
    pub fn definition(&self) -> &ResourceDef {
        &self.def
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn action_round_trips_through_str() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!(
            "publish".parse::<Action>(),
            Err(SchemaError::UnknownAction("publish".to_owned()))
        );
    }

    #[test]
    fn registered_resource_leads_with_id() {
        let r = Resource::from_validated(
            ResourceDef::new("post")
                .field(Field::string("title"))
                .field(Field::uint("authorId")),
        );
        let names: Vec<&str> = r.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["id", "title", "authorId"]);
        assert!(r.has_field("authorId"));
        assert_eq!(r.relations().count(), 0);
    }
}
