#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! ContentKit access control.
//!
//! Roles carry allow/deny [`Permission`]s scoped globally or to one resource.
//! [`PermissionResolver`] turns a caller's role ids plus a (resource, action)
//! pair into a [`Grant`] or [`AccessError::Forbidden`]:
//!
//! - within one role, a resource-scoped permission wins over a global one
//! - across roles, any deny wins (deny-overrides)
//! - no matching allow is an implicit deny
//! - root roles allow everything they do not explicitly deny

pub mod error;
pub mod resolver;
pub mod role;
pub mod store;

pub use error::{AccessError, RoleError};
pub use resolver::{Grant, PermissionResolver};
pub use role::{Effect, Permission, PermissionScope, Role, RoleId};
pub use store::{MemoryRoleStore, RoleStore};
