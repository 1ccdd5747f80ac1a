use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use agentd_core::{NextcheckPolicy, ResultWriter};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::metrics::SchedulerMetrics;
use crate::plugin::{Plugin, PluginImpl};
use crate::task::{Finisher, PluginId, TaskId};
use crate::types::{ItemRequest, SchedulerConfig};

/// Messages delivered to the scheduling loop.
pub(crate) enum Command {
    Finish(TaskId),
    Update {
        writer: Arc<dyn ResultWriter>,
        requests: Vec<ItemRequest>,
    },
    Shutdown,
}

/// Cloneable handle for talking to a running [`Scheduler`].
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Replace the full item set. Results for these items go to `writer`.
    pub fn update_items(
        &self,
        writer: Arc<dyn ResultWriter>,
        requests: Vec<ItemRequest>,
    ) -> Result<(), SchedulerError> {
        self.tx
            .send(Command::Update { writer, requests })
            .map_err(|_| SchedulerError::Closed)
    }

    /// Ask the loop to stop plugins, drain in-flight work and exit.
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.tx.send(Command::Shutdown).map_err(|_| SchedulerError::Closed)
    }
}

impl Finisher for SchedulerHandle {
    fn finish_task(&self, task: TaskId) {
        if self.tx.send(Command::Finish(task)).is_err() {
            debug!(task = %task, "scheduler gone, dropping completion");
        }
    }
}

/// The plugin task scheduler. Owns every plugin and task; all state changes
/// happen on the loop started by [`Scheduler::run`].
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) policy: NextcheckPolicy,
    pub(super) plugins: Vec<Plugin>,
    /// Metric name to the plugin serving it.
    pub(super) metric_index: HashMap<String, PluginId>,
    /// Item id to its exporter task.
    pub(super) exporters: HashMap<u64, TaskId>,
    /// Latest watcher task per plugin.
    pub(super) watchers: HashMap<PluginId, TaskId>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(super) handle: SchedulerHandle,
    pub(super) finisher: Arc<dyn Finisher>,
    pub(super) rx: mpsc::UnboundedReceiver<Command>,
    /// Set once shutdown begins.
    pub(super) shutdown_deadline: Option<Instant>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SchedulerHandle { tx };
        Self {
            policy: config.nextcheck_policy(),
            config,
            plugins: Vec::new(),
            metric_index: HashMap::new(),
            exporters: HashMap::new(),
            watchers: HashMap::new(),
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            finisher: Arc::new(handle.clone()),
            handle,
            rx,
            shutdown_deadline: None,
        }
    }

    /// Register a plugin. `capacity` defaults to the configured default.
    pub fn register_plugin(
        &mut self,
        imp: PluginImpl,
        capacity: Option<u32>,
    ) -> Result<PluginId, SchedulerError> {
        if self.plugins.iter().any(|p| p.name() == imp.name()) {
            return Err(SchedulerError::DuplicatePlugin(imp.name().to_string()));
        }
        for metric in imp.metrics() {
            if let Some(owner) = self.metric_index.get(metric) {
                return Err(SchedulerError::DuplicateMetric {
                    metric: metric.clone(),
                    plugin: self.plugins[owner.index()].name().to_string(),
                });
            }
        }

        let id = PluginId(self.plugins.len());
        let capacity = capacity.unwrap_or(self.config.default_capacity);
        let plugin = Plugin::new(id, imp, capacity)?;
        for metric in plugin.imp().metrics() {
            self.metric_index.insert(metric.clone(), id);
        }
        info!(
            plugin = %plugin.name(),
            capacity,
            capabilities = ?plugin.imp().capabilities(),
            "Registered plugin"
        );
        self.plugins.push(plugin);
        Ok(id)
    }

    /// Handle for item updates, shutdown, and task completions.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn plugin(&self, id: PluginId) -> Option<&Plugin> {
        self.plugins.get(id.index())
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Exporter task currently serving `itemid`.
    pub fn exporter_task(&self, itemid: u64) -> Option<TaskId> {
        self.exporters.get(&itemid).copied()
    }

    pub fn pending_count(&self) -> usize {
        self.plugins.iter().map(Plugin::pending_count).sum()
    }

    pub fn in_flight(&self) -> usize {
        self.plugins.iter().map(Plugin::in_flight).sum()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_deadline.is_some()
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        match self.metrics.read() {
            Ok(m) => m.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Get an Arc to the metrics (for external reads without cloning).
    pub fn metrics_handle(&self) -> Arc<RwLock<SchedulerMetrics>> {
        Arc::clone(&self.metrics)
    }

    pub(super) fn update_metrics(&self, f: impl FnOnce(&mut SchedulerMetrics)) {
        if let Ok(mut m) = self.metrics.write() {
            f(&mut m);
        }
    }

    /// Cancel a task. Pending tasks are dropped at once; running tasks finish
    /// but are not requeued. Returns false if the task was already inactive.
    pub fn deactivate_task(&mut self, id: TaskId) -> bool {
        let Some(plugin) = self.plugins.get_mut(id.plugin().index()) else {
            return false;
        };
        let deactivated = plugin.deactivate_task(id);
        if deactivated {
            self.forget(id);
        }
        deactivated
    }

    /// Drop bookkeeping entries that point at `id`.
    pub(super) fn forget(&mut self, id: TaskId) {
        self.exporters.retain(|_, task| *task != id);
        self.watchers.retain(|_, task| *task != id);
    }
}
