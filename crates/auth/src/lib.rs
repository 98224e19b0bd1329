//! `stratum-auth` — pure permission algebra for hierarchical snapshots.
//!
//! This crate is intentionally decoupled from storage, caching and transport:
//! every function here is deterministic over its inputs.

pub mod authorize;
pub mod calculate;
pub mod hierarchy;
pub mod permissions;
pub mod roles;
pub mod snapshot;

pub use authorize::{CheckExplanation, Decision, MatchLevel, decide, explain, lookup_keys};
pub use calculate::{Candidate, Resolution, applicable_roles, calculate, resolve};
pub use hierarchy::{ScopeChain, is_ancestor_path};
pub use permissions::{ADMIN_ACTION, Effect, ParseEffectError, PermissionKey, RolePermission, WILDCARD_RESOURCE};
pub use roles::{Role, RoleAssignment};
pub use snapshot::Snapshot;
