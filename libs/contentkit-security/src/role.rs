//! Role and permission value objects.

use std::collections::HashSet;
use std::fmt;

use contentkit_db::Filter;
use contentkit_schema::Action;
use serde::{Deserialize, Serialize};

use crate::error::RoleError;

/// Opaque role identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for RoleId {
    #[inline]
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// What a permission applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    /// Every resource.
    Global,
    /// One named resource.
    Resource(String),
}

impl PermissionScope {
    #[must_use]
    pub fn resource(name: impl Into<String>) -> Self {
        Self::Resource(name.into())
    }

    #[must_use]
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Resource(name) => Some(name),
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("*"),
            Self::Resource(name) => write!(f, "'{name}'"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

/// One allow/deny rule for an action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub scope: PermissionScope,
    pub action: Action,
    pub effect: Effect,
    /// Row-level restriction ANDed into queries when this allow is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Filter>,
}

impl Permission {
    #[must_use]
    pub fn allow(scope: PermissionScope, action: Action) -> Self {
        Self {
            scope,
            action,
            effect: Effect::Allow,
            policy: None,
        }
    }

    #[must_use]
    pub fn deny(scope: PermissionScope, action: Action) -> Self {
        Self {
            scope,
            action,
            effect: Effect::Deny,
            policy: None,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Filter) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.effect == Effect::Deny
    }
}

/// A named bundle of permissions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Root roles allow every action they do not explicitly deny.
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    #[must_use]
    pub fn new(id: impl Into<RoleId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            root: false,
            permissions: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(mut self) -> Self {
        self.root = true;
        self
    }

    #[must_use]
    pub fn permit(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Reject ambiguous definitions: two rules for one (scope, action), or a
    /// deny with a row policy.
    ///
    /// # Errors
    ///
    /// Returns the first [`RoleError`] found.
    pub fn validate(&self) -> Result<(), RoleError> {
        if self.name.trim().is_empty() {
            return Err(RoleError::EmptyName(self.id));
        }
        let mut seen = HashSet::new();
        for p in &self.permissions {
            if p.is_deny() && p.policy.is_some() {
                return Err(RoleError::DenyWithPolicy {
                    role: self.id,
                    scope: p.scope.clone(),
                    action: p.action,
                });
            }
            if !seen.insert((&p.scope, p.action)) {
                return Err(RoleError::DuplicateRule {
                    role: self.id,
                    scope: p.scope.clone(),
                    action: p.action,
                });
            }
        }
        Ok(())
    }
}
