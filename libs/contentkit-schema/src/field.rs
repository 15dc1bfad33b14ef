use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Cardinality of a relation field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// Whether the owning side holds a list of related ids.
    #[must_use]
    pub fn is_many(self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

/// Relation metadata: which resource the field points at and how.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub target: String,
    pub kind: RelationKind,
}

/// The declared type of a field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Text,
    Enum { values: Vec<String> },
    Json,
    Relation(RelationDef),
}

impl FieldType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::String => "string",
            Self::Text => "text",
            Self::Enum { .. } => "enum",
            Self::Json => "json",
            Self::Relation(_) => "relation",
        }
    }
}

/// A single field of a resource definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
            unique: false,
            default: None,
        }
    }

    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    #[must_use]
    pub fn uint(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Uint)
    }

    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    #[must_use]
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    #[must_use]
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Json)
    }

    #[must_use]
    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            FieldType::Enum {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    #[must_use]
    pub fn relation(name: impl Into<String>, target: impl Into<String>, kind: RelationKind) -> Self {
        Self::new(
            name,
            FieldType::Relation(RelationDef {
                target: target.into(),
                kind,
            }),
        )
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::Relation(_))
    }

    #[must_use]
    pub fn relation_def(&self) -> Option<&RelationDef> {
        match &self.field_type {
            FieldType::Relation(def) => Some(def),
            _ => None,
        }
    }

    /// Range operators (`<`, `>=`, ...) are only meaningful on these types.
    #[must_use]
    pub fn is_orderable(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::Int | FieldType::Uint | FieldType::Float | FieldType::String | FieldType::Text
        )
    }

    /// Pattern matching is only meaningful on these types.
    #[must_use]
    pub fn is_textual(&self) -> bool {
        matches!(
            self.field_type,
            FieldType::String | FieldType::Text | FieldType::Enum { .. }
        )
    }

    /// Whether a create payload must carry this field.
    #[must_use]
    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }

    /// Type compatibility check for a single value.
    ///
    /// `Null` is accepted only by optional fields.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.optional;
        }
        match &self.field_type {
            FieldType::Bool => matches!(value, Value::Bool(_)),
            FieldType::Int => match value {
                Value::Int(_) => true,
                Value::Uint(n) => i64::try_from(*n).is_ok(),
                _ => false,
            },
            FieldType::Uint => value.as_u64().is_some(),
            FieldType::Float => matches!(value, Value::Float(_) | Value::Int(_) | Value::Uint(_)),
            FieldType::String | FieldType::Text => matches!(value, Value::String(_)),
            FieldType::Enum { values } => value
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v == s)),
            FieldType::Json => true,
            FieldType::Relation(def) => match value {
                Value::List(ids) if def.kind.is_many() => ids.iter().all(|id| id.as_u64().is_some()),
                other => !def.kind.is_many() && other.as_u64().is_some(),
            },
        }
    }
}
