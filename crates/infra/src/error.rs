//! Engine error taxonomy.

use thiserror::Error;

use stratum_core::Scope;

use crate::directory::StoreError;
use crate::snapshot_cache::CacheError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A referenced subsidiary or talent does not exist. Never defaulted to the
    /// tenant scope.
    #[error("scope not found: {0}")]
    ScopeNotFound(Scope),

    /// A read against the assignment, permission or scope stores failed.
    #[error("collaborator store unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A read or write against the snapshot cache failed.
    #[error("snapshot cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A manual reconciliation was requested while a sweep is running.
    #[error("reconciliation already in progress")]
    ReconciliationInProgress,
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::CollaboratorUnavailable(value.to_string())
    }
}

impl From<CacheError> for EngineError {
    fn from(value: CacheError) -> Self {
        Self::CacheUnavailable(value.to_string())
    }
}
