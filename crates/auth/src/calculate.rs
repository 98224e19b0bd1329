//! Effective Permission Calculator.
//!
//! Given a principal's assignments and a scope chain, resolve every permission
//! key mentioned by an applicable role into `grant` or `deny`.
//!
//! Deny is absolute: a deny from any applicable role wins, regardless of how far
//! up the chain it was attached. Candidate distance is tracked for audit only and
//! never breaks ties, so a tenant-level deny cannot be overridden by a more
//! specific grant.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::hierarchy::ScopeChain;
use crate::permissions::{Effect, PermissionKey, RolePermission};
use crate::roles::{Role, RoleAssignment};
use crate::snapshot::Snapshot;

/// One role's contribution to a permission key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub effect: Effect,
    pub role: Role,
    /// Position of the assignment's scope in the chain (root = 0).
    pub scope_index: usize,
    /// Assignment sits exactly at the chain's target.
    pub is_direct: bool,
}

/// All candidates per key, before the deny-wins reduction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    candidates: BTreeMap<PermissionKey, Vec<Candidate>>,
}

impl Resolution {
    pub fn candidates(&self, key: &PermissionKey) -> &[Candidate] {
        self.candidates.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Resolved effect for `key`; `None` when no applicable role mentions it.
    pub fn effect(&self, key: &PermissionKey) -> Option<Effect> {
        reduce(self.candidates(key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.candidates.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn into_snapshot(self) -> Snapshot {
        self.candidates
            .into_iter()
            .filter_map(|(key, candidates)| reduce(&candidates).map(|effect| (key, effect)))
            .collect()
    }
}

fn reduce(candidates: &[Candidate]) -> Option<Effect> {
    if candidates.iter().any(|c| c.effect == Effect::Deny) {
        Some(Effect::Deny)
    } else if candidates.iter().any(|c| c.effect == Effect::Grant) {
        Some(Effect::Grant)
    } else {
        None
    }
}

/// Assignments that take part in resolving `chain`, with their chain position
/// and whether they sit at the target.
fn applicable<'a>(
    assignments: &'a [RoleAssignment],
    chain: &'a ScopeChain,
    now: DateTime<Utc>,
) -> impl Iterator<Item = (&'a RoleAssignment, usize, bool)> + 'a {
    assignments.iter().filter_map(move |assignment| {
        if !assignment.is_active_at(now) {
            return None;
        }
        let scope_index = chain.position(&assignment.scope)?;
        let is_direct = chain.target() == Some(&assignment.scope);
        if !assignment.inherit && !is_direct {
            return None;
        }
        Some((assignment, scope_index, is_direct))
    })
}

/// Distinct roles whose permission sets are needed to resolve `chain`.
pub fn applicable_roles(
    assignments: &[RoleAssignment],
    chain: &ScopeChain,
    now: DateTime<Utc>,
) -> BTreeSet<Role> {
    applicable(assignments, chain, now)
        .map(|(assignment, _, _)| assignment.role.clone())
        .collect()
}

/// Collect candidates for every key mentioned by an applicable role.
///
/// `permissions` maps each role to its active entries; a role missing from the
/// map contributes nothing (inactive roles are filtered upstream).
pub fn resolve(
    assignments: &[RoleAssignment],
    chain: &ScopeChain,
    now: DateTime<Utc>,
    permissions: &HashMap<Role, Vec<RolePermission>>,
) -> Resolution {
    let mut candidates: BTreeMap<PermissionKey, Vec<Candidate>> = BTreeMap::new();

    for (assignment, scope_index, is_direct) in applicable(assignments, chain, now) {
        let Some(entries) = permissions.get(&assignment.role) else {
            continue;
        };
        for entry in entries {
            candidates.entry(entry.key()).or_default().push(Candidate {
                effect: entry.effect,
                role: assignment.role.clone(),
                scope_index,
                is_direct,
            });
        }
    }

    Resolution { candidates }
}

/// Resolve straight to a snapshot.
pub fn calculate(
    assignments: &[RoleAssignment],
    chain: &ScopeChain,
    now: DateTime<Utc>,
    permissions: &HashMap<Role, Vec<RolePermission>>,
) -> Snapshot {
    resolve(assignments, chain, now, permissions).into_snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use stratum_core::{PrincipalId, Scope, SubsidiaryId, TalentId};

    fn role_table(entries: &[(&'static str, Vec<RolePermission>)]) -> HashMap<Role, Vec<RolePermission>> {
        entries
            .iter()
            .map(|(name, perms)| (Role::new(*name), perms.clone()))
            .collect()
    }

    fn read_key() -> PermissionKey {
        PermissionKey::new("customer.profile", "read")
    }

    #[test]
    fn any_deny_wins_over_grants() {
        let p = PrincipalId::new();
        let assignments = vec![
            RoleAssignment::new(p, Role::new("viewer"), Scope::Tenant),
            RoleAssignment::new(p, Role::new("editor"), Scope::Tenant),
            RoleAssignment::new(p, Role::new("blocked"), Scope::Tenant),
        ];
        let perms = role_table(&[
            ("viewer", vec![RolePermission::grant("customer.profile", "read")]),
            ("editor", vec![RolePermission::grant("customer.profile", "read")]),
            ("blocked", vec![RolePermission::deny("customer.profile", "read")]),
        ]);

        let snapshot = calculate(&assignments, &ScopeChain::tenant(), Utc::now(), &perms);
        assert_eq!(snapshot.get(&read_key()), Some(Effect::Deny));
    }

    #[test]
    fn distant_deny_beats_direct_grant() {
        let p = PrincipalId::new();
        let sub = Scope::Subsidiary(SubsidiaryId::new());
        let talent = Scope::Talent(TalentId::new());
        let chain = ScopeChain::tenant().descend(sub).descend(talent);

        let assignments = vec![
            RoleAssignment::new(p, Role::new("blocked"), Scope::Tenant),
            RoleAssignment::new(p, Role::new("viewer"), talent),
        ];
        let perms = role_table(&[
            ("blocked", vec![RolePermission::deny("customer.profile", "read")]),
            ("viewer", vec![RolePermission::grant("customer.profile", "read")]),
        ]);

        let resolution = resolve(&assignments, &chain, Utc::now(), &perms);
        assert_eq!(resolution.effect(&read_key()), Some(Effect::Deny));

        let candidates = resolution.candidates(&read_key());
        assert_eq!(candidates.len(), 2);
        let deny = candidates.iter().find(|c| c.effect == Effect::Deny).unwrap();
        assert_eq!((deny.scope_index, deny.is_direct), (0, false));
        let grant = candidates.iter().find(|c| c.effect == Effect::Grant).unwrap();
        assert_eq!((grant.scope_index, grant.is_direct), (2, true));
    }

    #[test]
    fn non_inheriting_assignment_only_applies_at_its_scope() {
        let p = PrincipalId::new();
        let sub = Scope::Subsidiary(SubsidiaryId::new());
        let talent = Scope::Talent(TalentId::new());
        let assignments = vec![RoleAssignment::new(p, Role::new("viewer"), sub).with_inherit(false)];
        let perms = role_table(&[("viewer", vec![RolePermission::grant("customer.profile", "read")])]);

        let at_sub = calculate(&assignments, &ScopeChain::tenant().descend(sub), Utc::now(), &perms);
        assert_eq!(at_sub.get(&read_key()), Some(Effect::Grant));

        let below = ScopeChain::tenant().descend(sub).descend(talent);
        assert!(calculate(&assignments, &below, Utc::now(), &perms).is_empty());
    }

    #[test]
    fn off_chain_and_expired_assignments_are_ignored() {
        let p = PrincipalId::new();
        let sub = Scope::Subsidiary(SubsidiaryId::new());
        let unrelated = Scope::Subsidiary(SubsidiaryId::new());
        let now = Utc::now();
        let assignments = vec![
            RoleAssignment::new(p, Role::new("viewer"), unrelated),
            RoleAssignment::new(p, Role::new("viewer"), Scope::Tenant).expiring_at(now - Duration::minutes(1)),
        ];
        let perms = role_table(&[("viewer", vec![RolePermission::grant("customer.profile", "read")])]);

        let chain = ScopeChain::tenant().descend(sub);
        assert!(calculate(&assignments, &chain, now, &perms).is_empty());
        assert!(applicable_roles(&assignments, &chain, now).is_empty());
    }

    #[test]
    fn unmentioned_keys_are_absent() {
        let p = PrincipalId::new();
        let assignments = vec![RoleAssignment::new(p, Role::new("viewer"), Scope::Tenant)];
        let perms = role_table(&[("viewer", vec![RolePermission::grant("customer.profile", "read")])]);

        let snapshot = calculate(&assignments, &ScopeChain::tenant(), Utc::now(), &perms);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&PermissionKey::new("customer.profile", "write")), None);
    }

    #[test]
    fn inherited_chain_sees_only_inheriting_tenant_assignments() {
        let p = PrincipalId::new();
        let assignments = vec![
            RoleAssignment::new(p, Role::new("viewer"), Scope::Tenant),
            RoleAssignment::new(p, Role::new("editor"), Scope::Tenant).with_inherit(false),
        ];
        let perms = role_table(&[
            ("viewer", vec![RolePermission::grant("customer.profile", "read")]),
            ("editor", vec![RolePermission::grant("customer.profile", "write")]),
        ]);

        let snapshot = calculate(&assignments, &ScopeChain::inherited(), Utc::now(), &perms);
        assert_eq!(snapshot.get(&read_key()), Some(Effect::Grant));
        assert_eq!(snapshot.get(&PermissionKey::new("customer.profile", "write")), None);
    }

    fn arb_effect() -> impl Strategy<Value = Effect> {
        prop_oneof![Just(Effect::Grant), Just(Effect::Deny)]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a key resolves to grant only when no applicable role denies it.
        #[test]
        fn deny_is_never_overridden(
            roles in prop::collection::vec((arb_effect(), 0usize..3, any::<bool>()), 1..8)
        ) {
            let p = PrincipalId::new();
            let sub = Scope::Subsidiary(SubsidiaryId::new());
            let talent = Scope::Talent(TalentId::new());
            let chain = ScopeChain::tenant().descend(sub).descend(talent);
            let levels = [Scope::Tenant, sub, talent];

            let mut assignments = Vec::new();
            let mut perms = HashMap::new();
            let mut any_applicable_deny = false;
            let mut any_applicable = false;

            for (i, (effect, level, inherit)) in roles.iter().enumerate() {
                let role = Role::new(format!("role-{i}"));
                let scope = levels[*level];
                assignments.push(RoleAssignment::new(p, role.clone(), scope).with_inherit(*inherit));
                perms.insert(role, vec![RolePermission::new("customer.profile", "read", *effect)]);

                if *inherit || scope == talent {
                    any_applicable = true;
                    any_applicable_deny |= *effect == Effect::Deny;
                }
            }

            let snapshot = calculate(&assignments, &chain, Utc::now(), &perms);
            let resolved = snapshot.get(&read_key());

            if any_applicable_deny {
                prop_assert_eq!(resolved, Some(Effect::Deny));
            } else if any_applicable {
                prop_assert_eq!(resolved, Some(Effect::Grant));
            } else {
                prop_assert_eq!(resolved, None);
            }
        }

        /// Property: a non-inheriting assignment never reaches a descendant snapshot.
        #[test]
        fn non_inheriting_never_propagates(depth in 1usize..5) {
            let p = PrincipalId::new();
            let anchor = Scope::Subsidiary(SubsidiaryId::new());
            let mut chain = ScopeChain::tenant().descend(anchor);
            for _ in 0..depth {
                chain = chain.descend(Scope::Subsidiary(SubsidiaryId::new()));
            }

            let assignments = vec![RoleAssignment::new(p, Role::new("viewer"), anchor).with_inherit(false)];
            let mut perms = HashMap::new();
            perms.insert(Role::new("viewer"), vec![RolePermission::grant("customer.profile", "read")]);

            prop_assert!(calculate(&assignments, &chain, Utc::now(), &perms).is_empty());
        }
    }
}
