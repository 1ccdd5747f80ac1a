//! Capability interfaces a plugin may implement.
//!
//! A plugin provides any nonempty subset of [`Collector`], [`Exporter`],
//! [`Runner`] and [`Watcher`]. The scheduler checks for the capability a task
//! needs when the task is built, never while it runs.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::itemutil::Value;
use crate::result::ResultWriter;

/// The capability set a plugin can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Collector,
    Exporter,
    Runner,
    Watcher,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Collector => "collector",
            Capability::Exporter => "exporter",
            Capability::Runner => "runner",
            Capability::Watcher => "watcher",
        };
        f.write_str(name)
    }
}

/// One item a watcher should report on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub itemid: u64,
    pub key: String,
}

/// Periodically gathers data that exporters later serve.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<(), PluginError>;

    /// Collection period in seconds.
    fn period(&self) -> u32;
}

/// Answers a single item request on demand.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, key: &str, params: &[String]) -> Result<Value, PluginError>;
}

/// Lifecycle hooks run when the plugin is first needed and when it is released.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn start(&self);

    async fn stop(&self);
}

/// Long-lived subscription pushing results through a sink until the session ends.
#[async_trait]
pub trait Watcher: Send + Sync {
    async fn watch(&self, requests: &[Request], sink: Arc<dyn ResultWriter>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_names() {
        assert_eq!(Capability::Collector.to_string(), "collector");
        assert_eq!(Capability::Watcher.to_string(), "watcher");
        assert_eq!(serde_json::to_string(&Capability::Runner).unwrap(), "\"runner\"");
    }
}
