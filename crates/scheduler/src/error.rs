//! Scheduler error types.

use agentd_core::{Capability, DelayError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("plugin {plugin} does not implement the {capability} capability")]
    MissingCapability { plugin: String, capability: Capability },

    #[error("plugin {0} exposes no capabilities")]
    NoCapabilities(String),

    #[error("plugin {0} must have a positive capacity")]
    InvalidCapacity(String),

    #[error("plugin {0} is already registered")]
    DuplicatePlugin(String),

    #[error("metric {metric} is already provided by plugin {plugin}")]
    DuplicateMetric { metric: String, plugin: String },

    #[error("{0}")]
    Delay(#[from] DelayError),

    #[error("scheduler is no longer running")]
    Closed,

    #[error("Failed to parse configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
