//! Check-time resolution against a single snapshot.
//!
//! Three keys are consulted in a fixed order:
//! 1. `resource:action`
//! 2. `resource:admin`
//! 3. `*:admin`
//!
//! A `deny` at any of the three levels returns false, so `x:admin -> deny`
//! beats `x:write -> grant`. Without a deny, the first level holding a `grant`
//! returns true. No match at any level is false.

use serde::Serialize;

use crate::permissions::{Effect, PermissionKey};
use crate::snapshot::Snapshot;

/// Which lookup level decided a check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Exact,
    ResourceAdmin,
    GlobalAdmin,
}

const LEVELS: [MatchLevel; 3] = [MatchLevel::Exact, MatchLevel::ResourceAdmin, MatchLevel::GlobalAdmin];

/// Outcome of a check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub level: Option<MatchLevel>,
    pub effect: Option<Effect>,
}

impl Decision {
    pub fn no_match() -> Self {
        Self {
            allowed: false,
            level: None,
            effect: None,
        }
    }
}

/// The keys consulted for `resource`/`action`, in resolution order.
pub fn lookup_keys(resource: &str, action: &str) -> [PermissionKey; 3] {
    [
        PermissionKey::new(resource, action),
        PermissionKey::resource_admin(resource),
        PermissionKey::global_admin(),
    ]
}

/// Decide from the effects read for [`lookup_keys`], in the same order.
pub fn decide(effects: [Option<Effect>; 3]) -> Decision {
    let first = |wanted: Effect| {
        LEVELS
            .into_iter()
            .zip(effects)
            .find(|(_, effect)| *effect == Some(wanted))
            .map(|(level, _)| Decision {
                allowed: wanted.is_grant(),
                level: Some(level),
                effect: Some(wanted),
            })
    };
    first(Effect::Deny)
        .or_else(|| first(Effect::Grant))
        .unwrap_or_else(Decision::no_match)
}

impl Snapshot {
    /// Run the check resolution against this snapshot.
    pub fn decide(&self, resource: &str, action: &str) -> Decision {
        decide(lookup_keys(resource, action).map(|key| self.get(&key)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Check Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of a check decision.
#[derive(Debug, Clone, Serialize)]
pub struct CheckExplanation {
    /// The permission key that was checked.
    pub required_permission: String,

    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// The level that decided, if any.
    pub level: Option<MatchLevel>,

    pub effect: Option<Effect>,

    /// Cache key of the snapshot that was read, `None` when no snapshot existed.
    pub snapshot_key: Option<String>,
}

/// Explain a decision reached from `effects` read out of `snapshot_key`.
pub fn explain(
    resource: &str,
    action: &str,
    effects: [Option<Effect>; 3],
    snapshot_key: Option<String>,
) -> CheckExplanation {
    let keys = lookup_keys(resource, action);
    let decision = decide(effects);

    let reason = match (decision.level, decision.effect) {
        (Some(level), Some(effect)) => {
            let key = match level {
                MatchLevel::Exact => &keys[0],
                MatchLevel::ResourceAdmin => &keys[1],
                MatchLevel::GlobalAdmin => &keys[2],
            };
            format!("'{key}' is {effect} in the snapshot")
        }
        _ if snapshot_key.is_none() => "no snapshot exists for this principal and scope".to_string(),
        _ => {
            let tried: Vec<String> = keys.iter().map(|k| format!("'{k}'")).collect();
            format!("none of {} are present in the snapshot", tried.join(", "))
        }
    };

    CheckExplanation {
        required_permission: keys[0].to_string(),
        granted: decision.allowed,
        reason,
        level: decision.level,
        effect: decision.effect,
        snapshot_key,
    }
}
