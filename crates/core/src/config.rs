use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::itemutil::{DEFAULT_REFRESH_UNSUPPORTED, MAX_DELAY};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Parse an env var, falling back to `default` when unset or empty.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Process-wide agent settings read from `AGENT_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default tracing filter when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Seconds between checks of items marked unsupported.
    pub refresh_unsupported: u64,
    /// Capacity assigned to plugins that do not declare their own.
    pub default_capacity: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            refresh_unsupported: DEFAULT_REFRESH_UNSUPPORTED,
            default_capacity: 1,
        }
    }
}

impl AgentConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            log_filter: env_or("AGENT_LOG_FILTER", &defaults.log_filter),
            refresh_unsupported: env_parse("AGENT_REFRESH_UNSUPPORTED", defaults.refresh_unsupported)?,
            default_capacity: env_parse("AGENT_DEFAULT_CAPACITY", defaults.default_capacity)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_DELAY).contains(&self.refresh_unsupported) {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_REFRESH_UNSUPPORTED".to_string(),
                message: format!("must be between 1 and {MAX_DELAY} seconds"),
            });
        }
        if self.default_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AGENT_DEFAULT_CAPACITY".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Agent config loaded:");
        tracing::info!("  log filter:          {}", self.log_filter);
        tracing::info!("  refresh unsupported: {}s", self.refresh_unsupported);
        tracing::info!("  default capacity:    {}", self.default_capacity);
    }
}
