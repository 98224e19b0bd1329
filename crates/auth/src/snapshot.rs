use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::permissions::{Effect, PermissionKey};

/// Materialized `permission key → effect` map for one principal at one scope.
///
/// Keys are kept ordered so equal snapshots serialize identically. A key that no
/// applicable role mentions is absent, never stored as a third state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<PermissionKey, Effect>);

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PermissionKey, effect: Effect) {
        self.0.insert(key, effect);
    }

    pub fn get(&self, key: &PermissionKey) -> Option<Effect> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PermissionKey, &Effect)> {
        self.0.iter()
    }
}

impl FromIterator<(PermissionKey, Effect)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (PermissionKey, Effect)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
