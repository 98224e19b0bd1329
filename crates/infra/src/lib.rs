//! Infrastructure layer: collaborator stores, the snapshot cache, and the
//! engine that keeps snapshots in step with the stores.

pub mod check;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod manager;
pub mod reconcile;
pub mod resolver;
pub mod snapshot_cache;

pub use check::PermissionChecker;
pub use config::{ConfigError, EngineConfig};
pub use directory::{
    AssignmentStore, DirectorySeed, InMemoryDirectory, RolePermissionStore, ScopeAncestry, ScopeDirectory, SeedError,
    StoreError, Stores, SubsidiaryNode, TenantDirectory,
};
pub use engine::PermissionEngine;
pub use error::{EngineError, EngineResult};
pub use manager::{FanOutReport, PrincipalRefresh, SnapshotManager};
pub use reconcile::{ReconcileReport, ReconcileScheduler, Reconciler, SchedulerHandle, SchedulerStats};
pub use resolver::ScopeResolver;
pub use snapshot_cache::{CacheError, InMemorySnapshotCache, SnapshotCache, SnapshotKey, SnapshotSlot};
#[cfg(feature = "redis")]
pub use snapshot_cache::RedisSnapshotCache;
