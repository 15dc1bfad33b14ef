//! Deny-overrides permission resolution over a cached role projection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use contentkit_db::{Filter, validate_filter};
use contentkit_schema::{Action, Schema};

use crate::error::AccessError;
use crate::role::{Permission, PermissionScope, Role, RoleId};
use crate::store::RoleStore;

/// A successful access decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Grant {
    /// Lowest role id among the allowing roles.
    pub role_id: Option<RoleId>,
    /// The permission that matched for `role_id`; `None` for a root allow.
    pub permission: Option<Permission>,
    /// Row restriction to AND into queries and mutation targets. `None` when
    /// any allowing role is unrestricted.
    pub constraint: Option<Filter>,
}

/// Precomputed lookups for one role.
#[derive(Debug)]
struct RoleRules {
    role: Arc<Role>,
    scoped: HashMap<(String, Action), Permission>,
    global: HashMap<Action, Permission>,
}

impl RoleRules {
    fn new(role: Role) -> Self {
        let mut scoped = HashMap::new();
        let mut global = HashMap::new();
        for p in &role.permissions {
            match &p.scope {
                PermissionScope::Global => {
                    global.insert(p.action, p.clone());
                }
                PermissionScope::Resource(name) => {
                    scoped.insert((name.clone(), p.action), p.clone());
                }
            }
        }
        Self {
            role: Arc::new(role),
            scoped,
            global,
        }
    }

    /// The rule this role applies: resource-scoped first, then global.
    fn rule(&self, resource: &str, action: Action) -> Option<&Permission> {
        self.scoped
            .get(&(resource.to_owned(), action))
            .or_else(|| self.global.get(&action))
    }
}

#[derive(Debug, Default)]
struct Projection {
    roles: BTreeMap<RoleId, RoleRules>,
}

impl Projection {
    fn build(store: &dyn RoleStore, schema: Option<&Schema>) -> Self {
        let mut roles = BTreeMap::new();
        for mut role in store.roles() {
            if let Err(e) = role.validate() {
                tracing::warn!(role = %role.id, error = %e, "Skipping invalid role");
                continue;
            }
            if let Some(schema) = schema {
                prune(&mut role, schema);
            }
            roles.insert(role.id, RoleRules::new(role));
        }
        Self { roles }
    }
}

/// Drop resource-scoped permissions whose resource is gone, and allows whose
/// policy no longer fits the resource.
fn prune(role: &mut Role, schema: &Schema) {
    let id = role.id;
    role.permissions.retain(|p| {
        let Some(name) = p.scope.resource_name() else {
            return true;
        };
        let Some(resource) = schema.resource(name) else {
            tracing::warn!(role = %id, resource = name, action = %p.action, "Pruning permission for removed resource");
            return false;
        };
        if let Some(policy) = &p.policy
            && let Err(e) = validate_filter(resource, policy)
        {
            tracing::warn!(role = %id, resource = name, error = %e, "Pruning permission with stale policy");
            return false;
        }
        true
    });
}

/// Resolves role sets against (resource, action) pairs.
///
/// Reads go through a lock-free snapshot of the role projection; the
/// projection is rebuilt from the [`RoleStore`] by [`Self::refresh_for`].
pub struct PermissionResolver {
    store: Arc<dyn RoleStore>,
    projection: ArcSwap<Projection>,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("roles", &self.projection.load().roles.len())
            .finish_non_exhaustive()
    }
}

impl PermissionResolver {
    #[must_use]
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        let projection = Projection::build(store.as_ref(), None);
        Self {
            store,
            projection: ArcSwap::from_pointee(projection),
        }
    }

    /// Decide whether any of `role_ids` may perform `action` on `resource`.
    ///
    /// Duplicate ids are collapsed and unknown ids ignored. The decision does
    /// not depend on the order of `role_ids`.
    ///
    /// # Errors
    ///
    /// [`AccessError::Forbidden`] when any role denies, or none allows.
    pub fn resolve(
        &self,
        role_ids: &[RoleId],
        resource: &str,
        action: Action,
    ) -> Result<Grant, AccessError> {
        let projection = self.projection.load();
        let mut ids = role_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut allows: Vec<(RoleId, Option<&Permission>)> = Vec::new();
        let mut denied_by = None;
        for id in ids {
            let Some(rules) = projection.roles.get(&id) else {
                tracing::debug!(role = %id, "Ignoring unknown role id");
                continue;
            };
            match rules.rule(resource, action) {
                Some(p) if p.is_deny() => {
                    denied_by.get_or_insert(id);
                }
                Some(p) => allows.push((id, Some(p))),
                None if rules.role.root => allows.push((id, None)),
                None => {}
            }
        }

        let forbidden = |denied_by| AccessError::Forbidden {
            resource: resource.to_owned(),
            action,
            denied_by,
        };
        if denied_by.is_some() {
            tracing::debug!(resource, %action, ?denied_by, "Denied by explicit rule");
            return Err(forbidden(denied_by));
        }
        let Some(&(role_id, permission)) = allows.first() else {
            tracing::debug!(resource, %action, "No allowing rule");
            return Err(forbidden(None));
        };

        let unrestricted = allows
            .iter()
            .any(|(_, p)| p.is_none_or(|p| p.policy.is_none()));
        let constraint = if unrestricted {
            None
        } else {
            Some(Filter::any(
                allows
                    .iter()
                    .filter_map(|(_, p)| p.and_then(|p| p.policy.clone())),
            ))
        };

        Ok(Grant {
            role_id: Some(role_id),
            permission: permission.cloned(),
            constraint,
        })
    }

    /// Rebuild the projection, dropping rules that no longer fit `schema`.
    pub fn refresh_for(&self, schema: &Schema) {
        let projection = Projection::build(self.store.as_ref(), Some(schema));
        tracing::info!(
            roles = projection.roles.len(),
            generation = %schema.generation(),
            "Permission cache refreshed"
        );
        self.projection.store(Arc::new(projection));
    }

    /// All cached roles in ascending id order.
    #[must_use]
    pub fn roles(&self) -> Vec<Arc<Role>> {
        self.projection
            .load()
            .roles
            .values()
            .map(|r| Arc::clone(&r.role))
            .collect()
    }

    /// Cached roles for `ids`, in ascending id order; unknown ids are skipped.
    #[must_use]
    pub fn roles_from_ids(&self, ids: &[RoleId]) -> Vec<Arc<Role>> {
        let projection = self.projection.load();
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        ids.iter()
            .filter_map(|id| projection.roles.get(id).map(|r| Arc::clone(&r.role)))
            .collect()
    }

    #[must_use]
    pub fn role_detail(&self, id: RoleId) -> Option<Arc<Role>> {
        self.projection
            .load()
            .roles
            .get(&id)
            .map(|r| Arc::clone(&r.role))
    }

    /// The rule one role applies to (resource, action), if it has one.
    #[must_use]
    pub fn role_permission(&self, id: RoleId, resource: &str, action: Action) -> Option<Permission> {
        self.projection
            .load()
            .roles
            .get(&id)
            .and_then(|r| r.rule(resource, action).cloned())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::role::Permission;
    use crate::store::MemoryRoleStore;
    use contentkit_schema::{Field, ResourceDef, SchemaGeneration};

    fn post() -> PermissionScope {
        PermissionScope::resource("post")
    }

    fn post_schema() -> Schema {
        Schema::build(
            SchemaGeneration::INITIAL,
            vec![ResourceDef::new("post").field(Field::string("title"))],
        )
        .unwrap()
    }

    fn resolver(roles: impl IntoIterator<Item = Role>) -> (Arc<MemoryRoleStore>, PermissionResolver) {
        let store = Arc::new(MemoryRoleStore::with_roles(roles).unwrap());
        let resolver = PermissionResolver::new(store.clone());
        (store, resolver)
    }

    #[test]
    fn resource_scope_wins_within_a_role() {
        let (_, r) = resolver([Role::new(1, "editor")
            .permit(Permission::allow(PermissionScope::Global, Action::Delete))
            .permit(Permission::deny(post(), Action::Delete))]);
        assert!(r.resolve(&[RoleId(1)], "post", Action::Delete).is_err());
        assert!(r.resolve(&[RoleId(1)], "page", Action::Delete).is_ok());
    }

    #[test]
    fn no_rule_is_implicit_deny() {
        let (_, r) = resolver([Role::new(1, "reader").permit(Permission::allow(post(), Action::Read))]);
        assert_eq!(
            r.resolve(&[RoleId(1)], "post", Action::Update),
            Err(AccessError::Forbidden {
                resource: "post".to_owned(),
                action: Action::Update,
                denied_by: None,
            })
        );
        assert!(r.resolve(&[], "post", Action::Read).is_err());
    }

    #[test]
    fn root_allows_unless_explicitly_denied() {
        let (_, r) = resolver([
            Role::new(1, "admin").root(),
            Role::new(2, "frozen").permit(Permission::deny(PermissionScope::Global, Action::Delete)),
        ]);
        let grant = r.resolve(&[RoleId(1)], "post", Action::Delete).unwrap();
        assert_eq!(grant.role_id, Some(RoleId(1)));
        assert!(grant.permission.is_none());
        assert!(grant.constraint.is_none());
        assert!(matches!(
            r.resolve(&[RoleId(1), RoleId(2)], "post", Action::Delete),
            Err(AccessError::Forbidden { denied_by: Some(RoleId(2)), .. })
        ));
    }

    #[test]
    fn policies_of_all_allows_are_combined() {
        let (_, r) = resolver([
            Role::new(1, "own").permit(
                Permission::allow(post(), Action::List).with_policy(Filter::eq("authorId", 1u64)),
            ),
            Role::new(2, "public").permit(
                Permission::allow(post(), Action::List).with_policy(Filter::eq("status", "published")),
            ),
        ]);
        let grant = r.resolve(&[RoleId(2), RoleId(1)], "post", Action::List).unwrap();
        assert_eq!(grant.role_id, Some(RoleId(1)));
        assert_eq!(
            grant.constraint,
            Some(Filter::Or(vec![
                Filter::eq("authorId", 1u64),
                Filter::eq("status", "published"),
            ]))
        );
    }

    #[test]
    fn unrestricted_allow_drops_constraint() {
        let (_, r) = resolver([
            Role::new(1, "own").permit(
                Permission::allow(post(), Action::List).with_policy(Filter::eq("authorId", 1u64)),
            ),
            Role::new(2, "all").permit(Permission::allow(PermissionScope::Global, Action::List)),
        ]);
        let grant = r.resolve(&[RoleId(1), RoleId(2)], "post", Action::List).unwrap();
        assert!(grant.constraint.is_none());
    }

    #[test]
    fn store_writes_need_refresh() {
        let (store, r) = resolver([Role::new(1, "reader")]);
        store
            .upsert_role(Role::new(1, "reader").permit(Permission::allow(post(), Action::Read)))
            .unwrap();
        assert!(r.resolve(&[RoleId(1)], "post", Action::Read).is_err());
        r.refresh_for(&post_schema());
        assert!(r.resolve(&[RoleId(1)], "post", Action::Read).is_ok());
        assert_eq!(
            r.role_permission(RoleId(1), "post", Action::Read).map(|p| p.effect),
            Some(crate::role::Effect::Allow)
        );
    }

    #[test]
    fn refresh_for_prunes_removed_resources_and_stale_policies() {
        let (_, r) = resolver([Role::new(1, "editor")
            .permit(Permission::allow(post(), Action::Read))
            .permit(
                Permission::allow(PermissionScope::resource("page"), Action::Read)
                    .with_policy(Filter::eq("slug", "home")),
            )
            .permit(Permission::allow(PermissionScope::resource("tag"), Action::Read))]);
        let schema = Schema::build(
            SchemaGeneration::INITIAL,
            vec![
                ResourceDef::new("post").field(Field::string("title")),
                ResourceDef::new("page").field(Field::string("title")),
            ],
        )
        .unwrap();
        r.refresh_for(&schema);
        assert!(r.role_permission(RoleId(1), "post", Action::Read).is_some());
        assert!(r.role_permission(RoleId(1), "page", Action::Read).is_none());
        assert!(r.role_permission(RoleId(1), "tag", Action::Read).is_none());
    }

    #[test]
    fn role_lookups_skip_unknown_ids() {
        let (_, r) = resolver([Role::new(3, "c"), Role::new(1, "a")]);
        let names: Vec<_> = r
            .roles_from_ids(&[RoleId(3), RoleId(7), RoleId(1), RoleId(3)])
            .iter()
            .map(|role| role.name.clone())
            .collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(r.roles().len(), 2);
        assert!(r.role_detail(RoleId(7)).is_none());
    }
}
