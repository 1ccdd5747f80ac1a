//! Capacity-bounded task scheduler for agent plugins.
//!
//! Five kinds of work share one scheduling loop: plugin start and stop,
//! periodic collection, per-item export, and watch subscriptions. Each plugin
//! keeps its own pending queue ordered by due instant, with same-second ties
//! broken by task kind. Work runs on spawned tokio tasks and reports back
//! through [`SchedulerHandle`], which the loop serializes.

pub mod error;
pub mod metrics;
pub mod plugin;
pub mod queue;
pub mod runner;
pub mod task;
pub mod tasks;
pub mod types;

#[cfg(test)]
mod test_support;

pub use error::SchedulerError;
pub use metrics::SchedulerMetrics;
pub use plugin::{Completion, Plugin, PluginImpl};
pub use runner::{Scheduler, SchedulerHandle};
pub use task::{FinishGuard, Finisher, Performer, PluginId, Task, TaskId, TaskKind};
pub use tasks::{CollectorTask, ExporterTask, StarterTask, StopperTask, WatcherTask};
pub use types::{Item, ItemRequest, Priority, SchedulerConfig, WeightClass, scheduled_at};
