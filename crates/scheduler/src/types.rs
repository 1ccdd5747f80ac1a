use std::path::Path;
use std::time::Duration;

use agentd_core::itemutil::MAX_DELAY;
use agentd_core::{AgentConfig, NextcheckPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// Tie-break class for tasks due in the same second. Lower runs first.
///
/// The ordinal is added to the scheduled instant as nanoseconds, so comparing
/// scheduled instants alone orders same-second tasks by class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Priority {
    Starter = 0,
    Collector = 1,
    Watcher = 2,
    Exporter = 3,
    Stopper = 4,
}

impl Priority {
    pub fn offset_nanos(self) -> u32 {
        self as u32
    }
}

/// Snap `instant` to its whole second and add the priority offset.
pub fn scheduled_at(instant: DateTime<Utc>, priority: Priority) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(instant.timestamp(), priority.offset_nanos()).unwrap_or(instant)
}

/// How a task is charged against its plugin while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeightClass {
    /// Weight 1, accounted per item and exempt from the plugin capacity check.
    PerItem,
    /// Weight equal to the plugin capacity.
    PluginCapacity,
}

/// Target of an exporter task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub itemid: u64,
    pub key: String,
    pub delay: String,
    #[serde(default)]
    pub unsupported: bool,
}

/// One entry of an item update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub itemid: u64,
    pub key: String,
    #[serde(default = "default_delay")]
    pub delay: String,
    #[serde(default)]
    pub unsupported: bool,
}

fn default_delay() -> String {
    "60s".to_string()
}

impl ItemRequest {
    pub fn new(itemid: u64, key: impl Into<String>, delay: impl Into<String>) -> Self {
        Self {
            itemid,
            key: key.into(),
            delay: delay.into(),
            unsupported: false,
        }
    }
}

impl From<ItemRequest> for Item {
    fn from(r: ItemRequest) -> Self {
        Self {
            itemid: r.itemid,
            key: r.key,
            delay: r.delay,
            unsupported: r.unsupported,
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between queue scans in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// How long shutdown waits for in-flight tasks, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Check interval for unsupported items, in seconds.
    #[serde(default = "default_refresh_unsupported")]
    pub refresh_unsupported_secs: u64,
    /// Capacity for plugins registered without one.
    #[serde(default = "default_capacity")]
    pub default_capacity: u32,
}

fn default_tick_interval() -> u64 { 1000 }
fn default_shutdown_timeout() -> u64 { 5 }
fn default_refresh_unsupported() -> u64 { agentd_core::itemutil::DEFAULT_REFRESH_UNSUPPORTED }
fn default_capacity() -> u32 { 1 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            refresh_unsupported_secs: default_refresh_unsupported(),
            default_capacity: default_capacity(),
        }
    }
}

impl From<&AgentConfig> for SchedulerConfig {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            refresh_unsupported_secs: agent.refresh_unsupported,
            default_capacity: agent.default_capacity,
            ..Self::default()
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, SchedulerError> {
        let config: Self = toml::from_str(text).map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.tick_interval_ms == 0 {
            return Err(SchedulerError::Config("tick_interval_ms must be positive".into()));
        }
        if self.default_capacity == 0 {
            return Err(SchedulerError::Config("default_capacity must be positive".into()));
        }
        if !(1..=MAX_DELAY).contains(&self.refresh_unsupported_secs) {
            return Err(SchedulerError::Config(format!(
                "refresh_unsupported_secs must be between 1 and {MAX_DELAY}"
            )));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn nextcheck_policy(&self) -> NextcheckPolicy {
        NextcheckPolicy::new(self.refresh_unsupported_secs)
    }
}
