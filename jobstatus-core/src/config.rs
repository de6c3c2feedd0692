//! Repository Configuration
//!
//! Loaded from the process environment. Callers that want `.env` support
//! load it first (the CLI uses `dotenvy`).

use std::time::Duration;

use crate::constants::{
    ENV_ACQUIRE_TIMEOUT_SECS, ENV_DSN, ENV_DSN_FALLBACK, ENV_MAX_CONNECTIONS,
    POOL_ACQUIRE_TIMEOUT_SECS_DEFAULT, POOL_CONNECTIONS_COUNT_DEFAULT,
};

/// Connection settings for a repository backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    /// Connection target. Empty means "not configured"; `open` rejects it.
    pub dsn: String,
    /// Pool size upper bound. Never zero.
    pub max_connections: u32,
    /// How long an operation waits for a pooled connection
    pub acquire_timeout: Duration,
}

impl RepoConfig {
    /// Defaults for everything but the connection target.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            max_connections: POOL_CONNECTIONS_COUNT_DEFAULT,
            acquire_timeout: Duration::from_secs(POOL_ACQUIRE_TIMEOUT_SECS_DEFAULT),
        }
    }

    /// Read `JOBSTATUS_DSN` (or `DATABASE_URL`), `JOBSTATUS_MAX_CONNECTIONS`
    /// and `JOBSTATUS_ACQUIRE_TIMEOUT_SECS`.
    ///
    /// # Errors
    /// Fails if a numeric setting is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RepoConfig::from_env`] with an explicit lookup function.
    ///
    /// # Errors
    /// Fails if a numeric setting is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dsn = lookup(ENV_DSN)
            .filter(|s| !s.is_empty())
            .or_else(|| lookup(ENV_DSN_FALLBACK))
            .unwrap_or_default();

        let mut config = Self::new(dsn);

        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            config.max_connections = parse_number(ENV_MAX_CONNECTIONS, &raw)?;
            if config.max_connections == 0 {
                return Err(ConfigError::OutOfRange {
                    key: ENV_MAX_CONNECTIONS,
                    value: raw,
                });
            }
        }

        if let Some(raw) = lookup(ENV_ACQUIRE_TIMEOUT_SECS) {
            config.acquire_timeout =
                Duration::from_secs(parse_number(ENV_ACQUIRE_TIMEOUT_SECS, &raw)?);
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        key,
        value: raw.to_string(),
    })
}

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric setting does not parse
    #[error("{key} is not a number: {value:?}")]
    NotANumber {
        /// Environment variable
        key: &'static str,
        /// Raw value
        value: String,
    },

    /// A numeric setting parses but is not allowed
    #[error("{key} is out of range: {value:?}")]
    OutOfRange {
        /// Environment variable
        key: &'static str,
        /// Raw value
        value: String,
    },

    /// No connection target at open time
    #[error("no connection target configured (set {} or {})", ENV_DSN, ENV_DSN_FALLBACK)]
    NoDsn,
}
