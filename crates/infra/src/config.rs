//! Engine configuration (environment-driven, with defaults).

use std::time::Duration;

use thiserror::Error;

/// Snapshot safety-net expiry.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Reconciliation cadence.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Expiry applied to every snapshot write.
    pub snapshot_ttl: Duration,
    /// Wall-clock cadence of the reconciliation scheduler.
    pub reconcile_interval: Duration,
    /// Run a sweep as soon as the scheduler starts.
    pub reconcile_on_start: bool,
    /// Redis connection URL; `None` selects the in-memory snapshot cache.
    pub redis_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            reconcile_on_start: false,
            redis_url: None,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment.
    ///
    /// - `STRATUM_SNAPSHOT_TTL_SECS`
    /// - `STRATUM_RECONCILE_INTERVAL_SECS`
    /// - `STRATUM_RECONCILE_ON_START`
    /// - `REDIS_URL`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable lookup (tests, layered sources).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("STRATUM_SNAPSHOT_TTL_SECS") {
            config.snapshot_ttl = parse_secs("STRATUM_SNAPSHOT_TTL_SECS", &value)?;
        }
        if let Some(value) = lookup("STRATUM_RECONCILE_INTERVAL_SECS") {
            config.reconcile_interval = parse_secs("STRATUM_RECONCILE_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = lookup("STRATUM_RECONCILE_ON_START") {
            config.reconcile_on_start = parse_bool("STRATUM_RECONCILE_ON_START", &value)?;
        }
        config.redis_url = lookup("REDIS_URL").filter(|url| !url.trim().is_empty());

        Ok(config)
    }
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a positive number of seconds",
            value: value.to_string(),
        }),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            expected: "a boolean",
            value: value.to_string(),
        }),
    }
}
