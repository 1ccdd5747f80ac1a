use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::tasks::{CollectorTask, ExporterTask, StarterTask, StopperTask, WatcherTask};
use super::types::{Priority, WeightClass, scheduled_at};

/// Handle of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PluginId(pub(crate) usize);

impl PluginId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin#{}", self.0)
    }
}

/// Stable identity of a task. Encodes the owning plugin so completions can be
/// routed without a lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId {
    plugin: PluginId,
    seq: u64,
}

impl TaskId {
    pub(crate) fn new(plugin: PluginId, seq: u64) -> Self {
        Self { plugin, seq }
    }

    pub fn plugin(self) -> PluginId {
        self.plugin
    }

    pub fn seq(self) -> u64 {
        self.seq
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin, self.seq)
    }
}

/// Re-entry point from a task's concurrent work back into the scheduler.
///
/// Callable from any thread; implementations serialize the effect onto the
/// scheduling loop.
pub trait Finisher: Send + Sync {
    fn finish_task(&self, task: TaskId);
}

/// Reports completion of one task execution when dropped.
///
/// Moved into the spawned work so that every exit path, panics included,
/// reports exactly once.
pub struct FinishGuard {
    finisher: Arc<dyn Finisher>,
    task: TaskId,
}

impl FinishGuard {
    pub fn new(finisher: Arc<dyn Finisher>, task: TaskId) -> Self {
        Self { finisher, task }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.finisher.finish_task(self.task);
    }
}

/// Behavior a task variant layers on the base [`Task`] record.
pub trait Performer {
    fn priority(&self) -> Priority;

    /// Tasks default to a flat weight of 1 accounted per item.
    fn weight_class(&self) -> WeightClass {
        WeightClass::PerItem
    }

    /// Launch the work and return immediately. `guard` must be held by the
    /// launched work until it concludes.
    fn perform(&self, guard: FinishGuard);

    /// Next eligibility instant, or `None` when the task does not recur.
    fn reschedule(&self, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}

/// The closed set of task variants.
pub enum TaskKind {
    Starter(StarterTask),
    Collector(CollectorTask),
    Watcher(WatcherTask),
    Exporter(ExporterTask),
    Stopper(StopperTask),
}

impl TaskKind {
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::Starter(_) => "starter",
            TaskKind::Collector(_) => "collector",
            TaskKind::Watcher(_) => "watcher",
            TaskKind::Exporter(_) => "exporter",
            TaskKind::Stopper(_) => "stopper",
        }
    }

    pub(crate) fn performer(&self) -> &dyn Performer {
        match self {
            TaskKind::Starter(t) => t,
            TaskKind::Collector(t) => t,
            TaskKind::Watcher(t) => t,
            TaskKind::Exporter(t) => t,
            TaskKind::Stopper(t) => t,
        }
    }
}

impl fmt::Debug for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One schedulable unit of work bound to a plugin and an eligibility instant.
pub struct Task {
    id: TaskId,
    capacity: u32,
    scheduled: DateTime<Utc>,
    /// Position in the owning plugin's pending queue; `None` when not pending.
    index: Option<usize>,
    active: bool,
    running: bool,
    started: Option<Instant>,
    kind: TaskKind,
}

impl Task {
    pub(crate) fn new(id: TaskId, capacity: u32, kind: TaskKind, due: DateTime<Utc>) -> Self {
        let scheduled = scheduled_at(due, kind.performer().priority());
        Self {
            id,
            capacity,
            scheduled,
            index: None,
            active: true,
            running: false,
            started: None,
            kind,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn plugin(&self) -> PluginId {
        self.id.plugin()
    }

    pub fn scheduled(&self) -> DateTime<Utc> {
        self.scheduled
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: Option<usize>) {
        self.index = index;
    }

    /// Move the eligibility instant. The caller restores queue order.
    pub(crate) fn set_scheduled(&mut self, due: DateTime<Utc>) {
        self.scheduled = scheduled_at(due, self.priority());
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut TaskKind {
        &mut self.kind
    }

    pub fn priority(&self) -> Priority {
        self.kind.performer().priority()
    }

    pub fn weight_class(&self) -> WeightClass {
        self.kind.performer().weight_class()
    }

    /// Capacity units consumed while running.
    pub fn weight(&self) -> u32 {
        match self.weight_class() {
            WeightClass::PerItem => 1,
            WeightClass::PluginCapacity => self.capacity,
        }
    }

    /// Final; the owning plugin strikes the task from its queue first.
    pub(crate) fn mark_inactive(&mut self) {
        self.active = false;
    }

    pub(crate) fn perform(&mut self, finisher: Arc<dyn Finisher>) {
        self.running = true;
        self.started = Some(Instant::now());
        self.kind.performer().perform(FinishGuard::new(finisher, self.id));
    }

    /// Clears the running state and returns how long the execution took.
    pub(crate) fn finish(&mut self) -> Duration {
        self.running = false;
        self.started.take().map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Advance `scheduled` for periodic tasks. Returns false for one-shot tasks.
    pub fn reschedule(&mut self, now: DateTime<Utc>) -> bool {
        match self.kind.performer().reschedule(self.scheduled, now) {
            Some(next) => {
                self.scheduled = scheduled_at(next, self.priority());
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("scheduled", &self.scheduled)
            .field("index", &self.index)
            .field("active", &self.active)
            .field("running", &self.running)
            .finish()
    }
}
