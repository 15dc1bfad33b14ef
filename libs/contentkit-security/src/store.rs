//! Role storage seam.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::RoleError;
use crate::role::{Role, RoleId};

/// Synchronous read access to role definitions.
///
/// The resolver reads the store only when its projection is rebuilt.
pub trait RoleStore: Send + Sync {
    fn role(&self, id: RoleId) -> Option<Role>;

    /// All roles in ascending id order.
    fn roles(&self) -> Vec<Role>;
}

/// In-process role store.
///
/// Writes are not seen by a [`crate::PermissionResolver`] until it is refreshed.
#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    roles: RwLock<BTreeMap<RoleId, Role>>,
}

impl MemoryRoleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns the first [`RoleError`] of any role that fails validation;
    /// nothing is stored in that case.
    pub fn with_roles(roles: impl IntoIterator<Item = Role>) -> Result<Self, RoleError> {
        let store = Self::new();
        for role in roles {
            store.upsert_role(role)?;
        }
        Ok(store)
    }

    /// Insert or replace a role. Returns the previous definition.
    ///
    /// # Errors
    ///
    /// Returns [`RoleError`] if the role is ambiguous.
    pub fn upsert_role(&self, role: Role) -> Result<Option<Role>, RoleError> {
        role.validate()?;
        Ok(self.roles.write().insert(role.id, role))
    }

    pub fn remove_role(&self, id: RoleId) -> Option<Role> {
        self.roles.write().remove(&id)
    }
}

impl RoleStore for MemoryRoleStore {
    fn role(&self, id: RoleId) -> Option<Role> {
        self.roles.read().get(&id).cloned()
    }

    fn roles(&self) -> Vec<Role> {
        self.roles.read().values().cloned().collect()
    }
}
