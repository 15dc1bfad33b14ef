use contentkit_schema::Action;
use thiserror::Error;

use crate::role::{PermissionScope, RoleId};

/// Rejected role definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Two permissions of one role target the same (scope, action).
    #[error("role {role} has conflicting permissions for {action} on {scope}")]
    DuplicateRule {
        role: RoleId,
        scope: PermissionScope,
        action: Action,
    },

    /// Row policies narrow allows; a deny cannot carry one.
    #[error("role {role} attaches a row policy to a deny for {action} on {scope}")]
    DenyWithPolicy {
        role: RoleId,
        scope: PermissionScope,
        action: Action,
    },

    #[error("role {0} has an empty name")]
    EmptyName(RoleId),
}

/// Access decisions that refuse the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// `denied_by` names the lowest role id holding an explicit deny, or
    /// `None` when nothing allowed the action.
    #[error("{action} on '{resource}' is forbidden")]
    Forbidden {
        resource: String,
        action: Action,
        denied_by: Option<RoleId>,
    },
}
