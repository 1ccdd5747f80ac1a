use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::metrics::SchedulerMetrics;
use crate::plugin::Completion;
use crate::task::TaskId;

use super::core::Command;
use super::Scheduler;

impl Scheduler {
    /// Run the scheduling loop until a shutdown drains or times out. Returns
    /// the final metrics snapshot.
    ///
    /// The scheduler holds a sender of its own command channel, so dropping
    /// every [`SchedulerHandle`](super::SchedulerHandle) does not end the
    /// loop; only [`SchedulerHandle::shutdown`](super::SchedulerHandle::shutdown) does.
    pub async fn run(mut self) -> SchedulerMetrics {
        info!(
            plugins = self.plugins.len(),
            tick_ms = self.config.tick_interval_ms,
            "Scheduler starting"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.handle_command(command, Utc::now()),
                    // unreachable while `self.handle` holds a sender
                    None => break,
                },
                _ = ticker.tick() => {}
            }

            let now = Utc::now();
            self.process_queue(now);
            self.refresh_metrics(now);
            if self.drained() {
                break;
            }
        }

        info!("Scheduler stopped");
        self.metrics()
    }

    pub(crate) fn handle_command(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::Finish(id) => self.finish_task(id, now),
            Command::Update { writer, requests } => {
                if self.is_shutting_down() {
                    warn!(items = requests.len(), "Ignoring item update during shutdown");
                } else {
                    self.apply_update(writer, requests, now);
                }
            }
            Command::Shutdown => self.begin_shutdown(now),
        }
    }

    /// Start every due task that its plugin can admit, earliest first.
    /// Returns how many tasks were started.
    pub(crate) fn process_queue(&mut self, now: DateTime<Utc>) -> usize {
        let mut started = 0;
        loop {
            let mut best: Option<(DateTime<Utc>, usize)> = None;
            for (index, plugin) in self.plugins.iter().enumerate() {
                let Some(task) = plugin.peek_task() else {
                    continue;
                };
                if task.scheduled().timestamp() > now.timestamp() || !plugin.can_admit(task) {
                    continue;
                }
                if best.map_or(true, |(scheduled, _)| task.scheduled() < scheduled) {
                    best = Some((task.scheduled(), index));
                }
            }

            let Some((_, index)) = best else {
                break;
            };
            let plugin = &mut self.plugins[index];
            let Some(id) = plugin.pop_task() else {
                break;
            };
            if let Some(kind) = plugin.begin(id, Arc::clone(&self.finisher)) {
                debug!(plugin = %plugin.name(), task = %id, kind, "task started");
                started += 1;
            }
        }
        started
    }

    /// Apply a completion: release capacity, then requeue or retire the task.
    /// A completion for a task that is not running changes nothing.
    pub(crate) fn finish_task(&mut self, id: TaskId, now: DateTime<Utc>) {
        let Some(plugin) = self.plugins.get_mut(id.plugin().index()) else {
            warn!(task = %id, "completion for unknown plugin");
            return;
        };

        match plugin.complete(id, now) {
            Completion::Ignored => {
                warn!(task = %id, "completion for a task that is not running, ignoring");
                self.update_metrics(|m| m.ignored_completions += 1);
            }
            Completion::Requeued { kind, elapsed } => {
                debug!(task = %id, kind, ?elapsed, "task finished, requeued");
                self.update_metrics(|m| m.record_execution(kind, elapsed));
            }
            Completion::Retired { kind, elapsed } => {
                debug!(task = %id, kind, ?elapsed, "task finished, retired");
                self.update_metrics(|m| m.record_execution(kind, elapsed));
                self.forget(id);
            }
        }
    }

    fn refresh_metrics(&self, now: DateTime<Utc>) {
        let pending = self.pending_count();
        let in_flight = self.in_flight();
        let active = self.plugins.iter().filter(|p| p.is_active()).count();
        self.update_metrics(|m| {
            m.tasks_pending = pending;
            m.tasks_in_flight = in_flight;
            m.active_plugins = active;
            m.last_tick = Some(now);
        });
    }

    /// Whether a shutdown has finished draining or run out of time.
    pub(super) fn drained(&self) -> bool {
        let Some(deadline) = self.shutdown_deadline else {
            return false;
        };
        let in_flight = self.in_flight();
        let pending = self.pending_count();
        if in_flight == 0 && pending == 0 {
            info!("All tasks drained");
            return true;
        }
        if Instant::now() >= deadline {
            warn!(in_flight, pending, "Shutdown timeout elapsed, abandoning remaining tasks");
            return true;
        }
        false
    }
}
