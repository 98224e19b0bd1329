//! `stratum-core` — identifiers and the organizational scope model.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod scope;

pub use error::{DomainError, DomainResult};
pub use id::{PrincipalId, SubsidiaryId, TalentId, TenantId};
pub use scope::{Scope, ScopeKind};
