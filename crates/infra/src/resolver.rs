//! Scope Hierarchy Resolver.
//!
//! Turns a scope reference into its root-first [`ScopeChain`] by reading the
//! materialized paths held by the [`ScopeDirectory`]. Read-only, no caching.

use std::sync::Arc;

use tracing::instrument;

use stratum_auth::ScopeChain;
use stratum_core::{Scope, TenantId};

use crate::directory::{ScopeAncestry, ScopeDirectory};
use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct ScopeResolver {
    scopes: Arc<dyn ScopeDirectory>,
}

impl ScopeResolver {
    pub fn new(scopes: Arc<dyn ScopeDirectory>) -> Self {
        Self { scopes }
    }

    fn ancestry(&self, tenant_id: TenantId, scope: &Scope) -> EngineResult<ScopeAncestry> {
        self.scopes
            .scope_ancestry(tenant_id, scope)?
            .ok_or(EngineError::ScopeNotFound(*scope))
    }

    /// Root-first chain ending at `scope`.
    ///
    /// A subsidiary yields `[tenant, ..ancestors, subsidiary]`; a talent yields
    /// `[tenant, ..ancestors of its subsidiary, subsidiary, talent]`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, scope = %scope), err)]
    pub fn resolve_chain(&self, tenant_id: TenantId, scope: &Scope) -> EngineResult<ScopeChain> {
        if scope.is_tenant() {
            return Ok(ScopeChain::tenant());
        }

        let ancestry = self.ancestry(tenant_id, scope)?;
        let mut enclosing = self.scopes.subsidiaries_enclosing(tenant_id, &ancestry.path)?;
        enclosing.sort_by_key(|node| node.path.len());

        let chain = enclosing
            .into_iter()
            .fold(ScopeChain::tenant(), |chain, node| chain.descend(Scope::Subsidiary(node.id)));
        Ok(chain.descend(*scope))
    }

    /// Every subsidiary and talent strictly below `scope`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, scope = %scope), err)]
    pub fn descendants(&self, tenant_id: TenantId, scope: &Scope) -> EngineResult<Vec<Scope>> {
        let path = match scope {
            Scope::Tenant => "/".to_string(),
            _ => self.ancestry(tenant_id, scope)?.path,
        };
        Ok(self.scopes.scopes_within(tenant_id, &path)?)
    }
}

impl core::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScopeResolver").finish_non_exhaustive()
    }
}
