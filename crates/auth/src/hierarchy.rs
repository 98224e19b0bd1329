//! Scope chains: the root-first ancestry used to resolve inheritance.

use stratum_core::Scope;

/// Ordered list of scopes from the tenant root down to a target.
///
/// The chain always starts at [`Scope::Tenant`]. Its target is normally the last
/// element; the *inherited* chain has no target and models "some descendant of
/// the tenant that receives nothing but tenant-level inheritance".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
    target: Option<Scope>,
}

impl ScopeChain {
    /// The chain for the tenant root itself.
    pub fn tenant() -> Self {
        Self {
            scopes: vec![Scope::Tenant],
            target: Some(Scope::Tenant),
        }
    }

    /// The chain for an unnamed descendant reached only through the tenant.
    pub fn inherited() -> Self {
        Self {
            scopes: vec![Scope::Tenant],
            target: None,
        }
    }

    /// Append `scope` below the current tail and make it the target.
    pub fn descend(mut self, scope: Scope) -> Self {
        self.scopes.push(scope);
        self.target = Some(scope);
        self
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn target(&self) -> Option<&Scope> {
        self.target.as_ref()
    }

    /// Distance from the root (root = 0), `None` if `scope` is off the chain.
    pub fn position(&self, scope: &Scope) -> Option<usize> {
        self.scopes.iter().position(|s| s == scope)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl core::fmt::Display for ScopeChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, scope) in self.scopes.iter().enumerate() {
            if i > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{scope}")?;
        }
        if self.target.is_none() {
            f.write_str(" > *")?;
        }
        Ok(())
    }
}

/// Whether the materialized path `ancestor` strictly encloses `descendant`.
///
/// Paths are `/`-delimited with a trailing slash (`/A/B/`), so a plain prefix
/// test respects segment boundaries.
pub fn is_ancestor_path(ancestor: &str, descendant: &str) -> bool {
    descendant.len() > ancestor.len() && descendant.starts_with(ancestor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_core::{SubsidiaryId, TalentId};

    #[test]
    fn descend_builds_root_first() {
        let a = Scope::Subsidiary(SubsidiaryId::new());
        let t = Scope::Talent(TalentId::new());
        let chain = ScopeChain::tenant().descend(a).descend(t);

        assert_eq!(chain.scopes(), &[Scope::Tenant, a, t]);
        assert_eq!(chain.target(), Some(&t));
        assert_eq!(chain.position(&a), Some(1));
        assert_eq!(chain.position(&Scope::Talent(TalentId::new())), None);
    }

    #[test]
    fn inherited_chain_has_no_target() {
        let chain = ScopeChain::inherited();
        assert_eq!(chain.scopes(), &[Scope::Tenant]);
        assert!(chain.target().is_none());
    }

    #[test]
    fn path_ancestry_respects_segments() {
        assert!(is_ancestor_path("/A/", "/A/B/"));
        assert!(!is_ancestor_path("/A/", "/A/"));
        assert!(!is_ancestor_path("/A/", "/AB/"));
        assert!(!is_ancestor_path("/A/B/", "/A/"));
    }
}
