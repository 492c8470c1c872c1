//! Store call limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`PersistConfig::timeout_ms`].
pub const TIMEOUT_ENV: &str = "ZONING_MAP_STORE_TIMEOUT_MS";
/// Environment variable overriding [`PersistConfig::retries`].
pub const RETRIES_ENV: &str = "ZONING_MAP_STORE_RETRIES";
/// Environment variable overriding [`PersistConfig::backoff_ms`].
pub const BACKOFF_ENV: &str = "ZONING_MAP_STORE_BACKOFF_MS";

/// Timeout and retry settings applied to every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Upper bound for a single store call, in milliseconds.
    pub timeout_ms: u64,
    /// Extra attempts after a transient failure.
    pub retries: u32,
    /// Pause before each retry, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            retries: 1,
            backoff_ms: 250,
        }
    }
}

impl PersistConfig {
    /// Defaults overridden by any `ZONING_MAP_STORE_*` variables that are
    /// set. Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout_ms: env_or(TIMEOUT_ENV, defaults.timeout_ms),
            retries: env_or(RETRIES_ENV, defaults.retries),
            backoff_ms: env_or(BACKOFF_ENV, defaults.backoff_ms),
        }
    }

    /// [`Self::timeout_ms`] as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// [`Self::backoff_ms`] as a [`Duration`].
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    let Ok(raw) = std::env::var(name) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        log::warn!("Ignoring invalid {name}={raw}");
        default
    })
}
