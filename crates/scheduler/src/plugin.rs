use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agentd_core::{Capability, Collector, Exporter, Runner, Watcher};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::SchedulerError;
use crate::queue::TaskQueue;
use crate::task::{Finisher, PluginId, Task, TaskId, TaskKind};
use crate::types::WeightClass;

/// A plugin implementation: its name, the metrics it serves, and whichever
/// capabilities it provides.
#[derive(Clone)]
pub struct PluginImpl {
    name: Arc<str>,
    metrics: Vec<String>,
    collector: Option<Arc<dyn Collector>>,
    exporter: Option<Arc<dyn Exporter>>,
    runner: Option<Arc<dyn Runner>>,
    watcher: Option<Arc<dyn Watcher>>,
}

impl PluginImpl {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            metrics: Vec::new(),
            collector: None,
            exporter: None,
            runner: None,
            watcher: None,
        }
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    pub fn with_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics.extend(metrics.into_iter().map(Into::into));
        self
    }

    pub fn with_collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn Watcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn collector(&self) -> Option<&Arc<dyn Collector>> {
        self.collector.as_ref()
    }

    pub fn exporter(&self) -> Option<&Arc<dyn Exporter>> {
        self.exporter.as_ref()
    }

    pub fn runner(&self) -> Option<&Arc<dyn Runner>> {
        self.runner.as_ref()
    }

    pub fn watcher(&self) -> Option<&Arc<dyn Watcher>> {
        self.watcher.as_ref()
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();
        if self.collector.is_some() {
            caps.push(Capability::Collector);
        }
        if self.exporter.is_some() {
            caps.push(Capability::Exporter);
        }
        if self.runner.is_some() {
            caps.push(Capability::Runner);
        }
        if self.watcher.is_some() {
            caps.push(Capability::Watcher);
        }
        caps
    }

    pub(crate) fn missing(&self, capability: Capability) -> SchedulerError {
        SchedulerError::MissingCapability {
            plugin: self.name.to_string(),
            capability,
        }
    }
}

impl fmt::Debug for PluginImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginImpl")
            .field("name", &self.name)
            .field("metrics", &self.metrics)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

/// Outcome of a completion reported for one of the plugin's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The task was not running; nothing changed.
    Ignored,
    /// The task went back into the pending queue.
    Requeued { kind: &'static str, elapsed: Duration },
    /// The task is gone from the plugin.
    Retired { kind: &'static str, elapsed: Duration },
}

/// A registered plugin: capacity accounting plus the tasks it owns.
pub struct Plugin {
    id: PluginId,
    imp: PluginImpl,
    capacity: u32,
    used_capacity: u32,
    exports_in_flight: usize,
    /// A starter is running; item exports wait for it.
    starting: bool,
    active: bool,
    next_seq: u64,
    tasks: HashMap<TaskId, Task>,
    queue: TaskQueue,
}

impl Plugin {
    pub(crate) fn new(id: PluginId, imp: PluginImpl, capacity: u32) -> Result<Self, SchedulerError> {
        if capacity == 0 {
            return Err(SchedulerError::InvalidCapacity(imp.name().to_string()));
        }
        if imp.capabilities().is_empty() {
            return Err(SchedulerError::NoCapabilities(imp.name().to_string()));
        }
        Ok(Self {
            id,
            imp,
            capacity,
            used_capacity: 0,
            exports_in_flight: 0,
            starting: false,
            active: false,
            next_seq: 0,
            tasks: HashMap::new(),
            queue: TaskQueue::new(),
        })
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.imp.name()
    }

    pub fn imp(&self) -> &PluginImpl {
        &self.imp
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn used_capacity(&self) -> u32 {
        self.used_capacity
    }

    pub fn exports_in_flight(&self) -> usize {
        self.exports_in_flight
    }

    /// Whether the plugin currently serves at least one item.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn has_capacity(&self, weight: u32) -> bool {
        self.used_capacity.saturating_add(weight) <= self.capacity
    }

    pub fn can_admit(&self, task: &Task) -> bool {
        match task.weight_class() {
            WeightClass::PerItem => !self.starting,
            WeightClass::PluginCapacity => self.has_capacity(task.weight()),
        }
    }

    fn reserve_capacity(&mut self, class: WeightClass, weight: u32) {
        match class {
            WeightClass::PerItem => self.exports_in_flight += 1,
            WeightClass::PluginCapacity => self.used_capacity += weight,
        }
    }

    fn release_capacity(&mut self, class: WeightClass, weight: u32) {
        match class {
            WeightClass::PerItem => self.exports_in_flight = self.exports_in_flight.saturating_sub(1),
            WeightClass::PluginCapacity => self.used_capacity = self.used_capacity.saturating_sub(weight),
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.values().filter(|t| t.is_running()).count()
    }

    /// Create a task owned by this plugin and queue it for `due`.
    pub(crate) fn add_task(&mut self, kind: TaskKind, due: DateTime<Utc>) -> TaskId {
        let id = TaskId::new(self.id, self.next_seq);
        self.next_seq += 1;
        self.tasks.insert(id, Task::new(id, self.capacity, kind, due));
        self.enqueue_task(id);
        id
    }

    pub(crate) fn enqueue_task(&mut self, id: TaskId) {
        self.queue.push(&mut self.tasks, id);
    }

    pub fn peek_task(&self) -> Option<&Task> {
        self.queue.peek().and_then(|id| self.tasks.get(&id))
    }

    pub(crate) fn pop_task(&mut self) -> Option<TaskId> {
        self.queue.pop(&mut self.tasks)
    }

    pub(crate) fn remove_task(&mut self, index: usize) -> Option<TaskId> {
        self.queue.remove(&mut self.tasks, index)
    }

    /// Move a pending task to a new due instant.
    pub(crate) fn reschedule_pending(&mut self, id: TaskId, due: DateTime<Utc>) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        let Some(index) = task.index() else {
            return;
        };
        task.set_scheduled(due);
        self.queue.fix(&mut self.tasks, index);
    }

    /// First pending task matching `pred`.
    pub(crate) fn find_pending(&self, pred: impl Fn(&TaskKind) -> bool) -> Option<TaskId> {
        self.tasks
            .values()
            .find(|t| t.index().is_some() && pred(t.kind()))
            .map(Task::id)
    }

    /// Strike the task from the pending queue and mark it inactive.
    ///
    /// A running task stays in the arena until its completion arrives, which
    /// then retires it instead of requeueing. Returns false if the task was
    /// already inactive or unknown.
    pub(crate) fn deactivate_task(&mut self, id: TaskId) -> bool {
        let Some(index) = self.tasks.get(&id).filter(|t| t.active()).map(Task::index) else {
            return false;
        };
        if let Some(index) = index {
            self.remove_task(index);
        }
        if let Some(task) = self.tasks.get_mut(&id) {
            task.mark_inactive();
            if !task.is_running() {
                self.tasks.remove(&id);
            }
        }
        debug!(plugin = %self.name(), task = %id, "task deactivated");
        true
    }

    /// Deactivate every task the plugin owns.
    pub(crate) fn deactivate_all(&mut self) -> usize {
        let ids: Vec<TaskId> = self.tasks.keys().copied().collect();
        ids.into_iter().filter(|id| self.deactivate_task(*id)).count()
    }

    /// Start a task already taken off the queue, charging its weight.
    pub(crate) fn begin(&mut self, id: TaskId, finisher: Arc<dyn Finisher>) -> Option<&'static str> {
        let task = self.tasks.get(&id)?;
        let (class, weight) = (task.weight_class(), task.weight());
        self.reserve_capacity(class, weight);
        let task = self.tasks.get_mut(&id)?;
        task.perform(finisher);
        if matches!(task.kind(), TaskKind::Starter(_)) {
            self.starting = true;
        }
        Some(task.kind().name())
    }

    /// Apply a completion report: release capacity, then requeue or retire.
    pub(crate) fn complete(&mut self, id: TaskId, now: DateTime<Utc>) -> Completion {
        let Some(task) = self.tasks.get_mut(&id).filter(|t| t.is_running()) else {
            return Completion::Ignored;
        };
        let elapsed = task.finish();
        let kind = task.kind().name();
        let (class, weight) = (task.weight_class(), task.weight());
        if matches!(task.kind(), TaskKind::Starter(_)) {
            self.starting = false;
        }
        let requeue = task.active() && task.reschedule(now);
        self.release_capacity(class, weight);

        if requeue {
            self.enqueue_task(id);
            Completion::Requeued { kind, elapsed }
        } else {
            if let Some(mut task) = self.tasks.remove(&id) {
                task.mark_inactive();
            }
            Completion::Retired { kind, elapsed }
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("capacity", &self.capacity)
            .field("used_capacity", &self.used_capacity)
            .field("exports_in_flight", &self.exports_in_flight)
            .field("active", &self.active)
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use agentd_core::ChannelWriter;

    use super::*;
    use crate::tasks::{CollectorTask, ExporterTask, StarterTask, StopperTask, WatcherTask};
    use crate::test_support::{MockPlugin, RecordingFinisher, full_impl, plugin_id};
    use crate::types::{Item, Priority};

    fn plugin(mock: &Arc<MockPlugin>, capacity: u32) -> Plugin {
        Plugin::new(plugin_id(0), full_impl("mock", mock), capacity).unwrap()
    }

    fn exporter(plugin: &Plugin, itemid: u64) -> TaskKind {
        let (writer, _rx) = ChannelWriter::channel();
        let item = Item {
            itemid,
            key: "mock.value".into(),
            delay: "10s".into(),
            unsupported: false,
        };
        TaskKind::Exporter(ExporterTask::new(plugin.imp(), item, Arc::new(writer), Default::default()).unwrap())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn rejects_zero_capacity_and_empty_capabilities() {
        let mock = MockPlugin::new();
        assert!(matches!(
            Plugin::new(plugin_id(0), full_impl("mock", &mock), 0),
            Err(SchedulerError::InvalidCapacity(_))
        ));
        assert!(matches!(
            Plugin::new(plugin_id(0), PluginImpl::new("empty").with_metric("empty.key"), 1),
            Err(SchedulerError::NoCapabilities(_))
        ));
    }

    #[test]
    fn same_instant_tasks_pop_in_priority_order() {
        let mock = MockPlugin::new();
        let mut plugin = plugin(&mock, 1);
        let imp = plugin.imp().clone();
        let (writer, _rx) = ChannelWriter::channel();

        // inserted in reverse priority order
        plugin.add_task(TaskKind::Stopper(StopperTask::new(&imp).unwrap()), at(100));
        let export = exporter(&plugin, 1);
        plugin.add_task(export, at(100));
        plugin.add_task(
            TaskKind::Watcher(WatcherTask::new(&imp, Vec::new(), Arc::new(writer)).unwrap()),
            at(100),
        );
        plugin.add_task(TaskKind::Collector(CollectorTask::new(&imp).unwrap()), at(100));
        plugin.add_task(TaskKind::Starter(StarterTask::new(&imp).unwrap()), at(100));

        let mut order = Vec::new();
        while let Some(id) = plugin.pop_task() {
            order.push(plugin.task(id).unwrap().priority());
        }
        assert_eq!(
            order,
            vec![
                Priority::Starter,
                Priority::Collector,
                Priority::Watcher,
                Priority::Exporter,
                Priority::Stopper
            ]
        );
    }

    #[test]
    fn weights_follow_task_kind() {
        let mock = MockPlugin::new();
        let mut plugin = plugin(&mock, 4);
        let imp = plugin.imp().clone();
        let collector = plugin.add_task(TaskKind::Collector(CollectorTask::new(&imp).unwrap()), at(1));
        let starter = plugin.add_task(TaskKind::Starter(StarterTask::new(&imp).unwrap()), at(1));
        let export = exporter(&plugin, 1);
        let export = plugin.add_task(export, at(1));
        assert_eq!(plugin.task(collector).unwrap().weight(), 4);
        assert_eq!(plugin.task(starter).unwrap().weight(), 4);
        assert_eq!(plugin.task(export).unwrap().weight(), 1);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let mock = MockPlugin::new();
        let mut plugin = plugin(&mock, 1);
        let first = exporter(&plugin, 1);
        let second = exporter(&plugin, 2);
        let keep = plugin.add_task(first, at(10));
        let gone = plugin.add_task(second, at(20));
        assert_eq!(plugin.pending_count(), 2);

        assert!(plugin.deactivate_task(gone));
        assert_eq!(plugin.pending_count(), 1);
        assert!(!plugin.deactivate_task(gone));
        assert_eq!(plugin.pending_count(), 1);
        assert!(plugin.task(gone).is_none());
        assert_eq!(plugin.peek_task().map(Task::id), Some(keep));
    }

    #[tokio::test]
    async fn running_task_deactivation_suppresses_requeue() {
        let mock = MockPlugin::new();
        let mut plugin = plugin(&mock, 1);
        let imp = plugin.imp().clone();
        let (finisher, _done) = RecordingFinisher::new();
        let id = plugin.add_task(TaskKind::Collector(CollectorTask::new(&imp).unwrap()), at(10));

        assert_eq!(plugin.pop_task(), Some(id));
        plugin.begin(id, finisher);
        assert!(plugin.deactivate_task(id));
        let task = plugin.task(id).unwrap();
        assert!(!task.active());
        assert_eq!(task.index(), None);

        assert!(matches!(plugin.complete(id, at(11)), Completion::Retired { kind: "collector", .. }));
        assert!(plugin.task(id).is_none());
        assert_eq!(plugin.used_capacity(), 0);
    }

    #[tokio::test]
    async fn collector_blocks_capacity_while_exports_run_alongside() {
        let mock = MockPlugin::new();
        let mut plugin = plugin(&mock, 2);
        let imp = plugin.imp().clone();
        let (finisher, _done) = RecordingFinisher::new();

        let collector = plugin.add_task(TaskKind::Collector(CollectorTask::new(&imp).unwrap()), at(10));
        let export = exporter(&plugin, 1);
        let export = plugin.add_task(export, at(10));

        let head = plugin.pop_task().unwrap();
        assert_eq!(head, collector);
        assert!(plugin.can_admit(plugin.task(head).unwrap()));
        plugin.begin(head, finisher.clone());
        assert_eq!(plugin.used_capacity(), 2);

        let starter = plugin.add_task(TaskKind::Starter(StarterTask::new(&imp).unwrap()), at(10));
        assert_eq!(plugin.peek_task().map(Task::id), Some(starter));
        assert!(!plugin.can_admit(plugin.task(starter).unwrap()));
        plugin.deactivate_task(starter);

        let head = plugin.pop_task().unwrap();
        assert_eq!(head, export);
        assert!(plugin.can_admit(plugin.task(head).unwrap()));
        plugin.begin(head, finisher);
        assert_eq!(plugin.exports_in_flight(), 1);
        assert_eq!(plugin.used_capacity(), 2);
        assert_eq!(plugin.in_flight(), 2);
    }

    #[tokio::test]
    async fn exports_wait_for_running_starter() {
        let mock = MockPlugin::new();
        let mut plugin = plugin(&mock, 1);
        let imp = plugin.imp().clone();
        let (finisher, _done) = RecordingFinisher::new();
        let starter = plugin.add_task(TaskKind::Starter(StarterTask::new(&imp).unwrap()), at(10));
        let export = exporter(&plugin, 1);
        let export = plugin.add_task(export, at(11));

        plugin.pop_task();
        plugin.begin(starter, finisher);
        assert!(!plugin.can_admit(plugin.task(export).unwrap()));

        assert!(matches!(plugin.complete(starter, at(11)), Completion::Retired { kind: "starter", .. }));
        assert!(plugin.can_admit(plugin.task(export).unwrap()));
    }

    #[tokio::test]
    async fn second_completion_is_ignored() {
        let mock = MockPlugin::with_period(5);
        let mut plugin = plugin(&mock, 1);
        let imp = plugin.imp().clone();
        let (finisher, _done) = RecordingFinisher::new();
        let id = plugin.add_task(TaskKind::Collector(CollectorTask::new(&imp).unwrap()), at(10));

        plugin.pop_task();
        plugin.begin(id, finisher);
        assert!(matches!(plugin.complete(id, at(10)), Completion::Requeued { .. }));
        assert_eq!(plugin.complete(id, at(10)), Completion::Ignored);
        assert_eq!(plugin.pending_count(), 1);
        assert_eq!(plugin.task(id).unwrap().scheduled().timestamp(), 15);
    }
}
