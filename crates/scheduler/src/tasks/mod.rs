mod collector_task;
mod exporter_task;
mod starter_task;
mod stopper_task;
mod watcher_task;

pub use collector_task::CollectorTask;
pub use exporter_task::ExporterTask;
pub use starter_task::StarterTask;
pub use stopper_task::StopperTask;
pub use watcher_task::WatcherTask;
