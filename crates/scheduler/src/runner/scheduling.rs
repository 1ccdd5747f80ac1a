use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use agentd_core::{ItemResult, PluginError, Request, ResultWriter, parse_key};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::task::{PluginId, TaskId, TaskKind};
use crate::tasks::{CollectorTask, ExporterTask, StarterTask, StopperTask, WatcherTask};
use crate::types::{Item, ItemRequest};

use super::Scheduler;

impl Scheduler {
    /// Reconcile tasks with a full item set.
    ///
    /// Requests that cannot be served get one error result each. Exporter
    /// items get their task created or updated; watcher items are batched
    /// per plugin, and a watcher left without items gets an empty batch.
    /// Exporter tasks for items missing from the set are deactivated, and
    /// plugins gain or lose activation to match.
    pub(crate) fn apply_update(
        &mut self,
        writer: Arc<dyn ResultWriter>,
        requests: Vec<ItemRequest>,
        now: DateTime<Utc>,
    ) {
        let mut seen = HashSet::new();
        let mut referenced = HashSet::new();
        let mut batches: HashMap<PluginId, Vec<Request>> = HashMap::new();

        for request in requests {
            let itemid = request.itemid;
            let metric = match parse_key(&request.key) {
                Ok((metric, _)) => metric,
                Err(e) => {
                    writer.write(ItemResult::error(itemid, now, PluginError::from(e).to_string()));
                    continue;
                }
            };
            let Some(&pid) = self.metric_index.get(&metric) else {
                writer.write(ItemResult::error(itemid, now, format!("Unknown metric {metric}")));
                continue;
            };

            let imp = self.plugins[pid.index()].imp();
            let (exports, watches) = (imp.exporter().is_some(), imp.watcher().is_some());
            if exports {
                match self.upsert_exporter(pid, request.into(), Arc::clone(&writer), now) {
                    Ok(()) => {
                        seen.insert(itemid);
                        referenced.insert(pid);
                    }
                    Err(e) => writer.write(ItemResult::error(itemid, now, e.to_string())),
                }
            } else if watches {
                batches.entry(pid).or_default().push(Request {
                    itemid,
                    key: request.key,
                });
                referenced.insert(pid);
            } else {
                writer.write(ItemResult::error(itemid, now, PluginError::UnsupportedKey.to_string()));
            }
        }

        let stale: Vec<(u64, TaskId)> = self
            .exporters
            .iter()
            .filter(|(itemid, _)| !seen.contains(*itemid))
            .map(|(itemid, task)| (*itemid, *task))
            .collect();
        for (itemid, task) in stale {
            self.exporters.remove(&itemid);
            self.deactivate_task(task);
        }

        // watchers keep their last batch until told otherwise
        let unwatched: Vec<PluginId> = self
            .plugins
            .iter()
            .filter(|p| p.imp().exporter().is_none() && p.imp().watcher().is_some())
            .filter(|p| p.is_active() || self.watchers.contains_key(&p.id()))
            .map(|p| p.id())
            .filter(|pid| !batches.contains_key(pid))
            .collect();

        for (pid, batch) in batches {
            self.queue_watcher(pid, batch, Arc::clone(&writer), now);
        }

        for index in 0..self.plugins.len() {
            let pid = self.plugins[index].id();
            match (self.plugins[index].is_active(), referenced.contains(&pid)) {
                (false, true) => self.activate_plugin(pid, now),
                (true, false) => self.deactivate_plugin(pid, now),
                _ => {}
            }
        }

        // queued after deactivation so the empty batch is not cancelled
        for pid in unwatched {
            self.queue_watcher(pid, Vec::new(), Arc::clone(&writer), now);
        }

        info!(
            exporters = self.exporters.len(),
            watchers = self.watchers.len(),
            "Item update applied"
        );
    }

    /// Create the item's exporter task, or retarget the existing one.
    fn upsert_exporter(
        &mut self,
        pid: PluginId,
        item: Item,
        writer: Arc<dyn ResultWriter>,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let due = self
            .policy
            .nextcheck(item.itemid, &item.delay, item.unsupported, now)?;
        let itemid = item.itemid;

        if let Some(existing) = self.exporters.get(&itemid).copied() {
            if existing.plugin() == pid && self.update_exporter(existing, &item, &writer, due) {
                return Ok(());
            }
            self.exporters.remove(&itemid);
            self.deactivate_task(existing);
        }

        let plugin = &mut self.plugins[pid.index()];
        let task = ExporterTask::new(plugin.imp(), item, writer, self.policy)?;
        let id = plugin.add_task(TaskKind::Exporter(task), due);
        self.exporters.insert(itemid, id);
        Ok(())
    }

    /// Update a live exporter task in place. A pending task whose schedule
    /// inputs changed moves to `due`.
    fn update_exporter(
        &mut self,
        id: TaskId,
        item: &Item,
        writer: &Arc<dyn ResultWriter>,
        due: DateTime<Utc>,
    ) -> bool {
        let Some(plugin) = self.plugins.get_mut(id.plugin().index()) else {
            return false;
        };
        let Some(task) = plugin.task_mut(id).filter(|t| t.active()) else {
            return false;
        };
        let TaskKind::Exporter(exporter) = task.kind_mut() else {
            return false;
        };
        let moved = exporter.item().delay != item.delay || exporter.item().unsupported != item.unsupported;
        exporter.update(item.clone(), Arc::clone(writer));
        if moved {
            plugin.reschedule_pending(id, due);
        }
        true
    }

    /// Queue a watcher task with the plugin's full request batch, replacing
    /// any earlier one.
    fn queue_watcher(
        &mut self,
        pid: PluginId,
        batch: Vec<Request>,
        writer: Arc<dyn ResultWriter>,
        now: DateTime<Utc>,
    ) {
        if let Some(previous) = self.watchers.remove(&pid) {
            self.deactivate_task(previous);
        }
        let plugin = &mut self.plugins[pid.index()];
        match WatcherTask::new(plugin.imp(), batch, writer) {
            Ok(task) => {
                let id = plugin.add_task(TaskKind::Watcher(task), now);
                self.watchers.insert(pid, id);
            }
            Err(e) => warn!(plugin = %plugin.name(), error = %e, "cannot queue watcher"),
        }
    }

    /// First item arrived: start the plugin and its collection cycle.
    pub(crate) fn activate_plugin(&mut self, pid: PluginId, now: DateTime<Utc>) {
        let plugin = &mut self.plugins[pid.index()];
        let imp = plugin.imp().clone();
        plugin.set_active(true);

        if imp.runner().is_some() {
            // a stop that never ran leaves the plugin started
            if let Some(stopper) = plugin.find_pending(|k| matches!(k, TaskKind::Stopper(_))) {
                plugin.deactivate_task(stopper);
            } else {
                match StarterTask::new(&imp) {
                    Ok(task) => {
                        plugin.add_task(TaskKind::Starter(task), now);
                    }
                    Err(e) => warn!(plugin = %imp.name(), error = %e, "cannot queue starter"),
                }
            }
        }

        if imp.collector().is_some() {
            match CollectorTask::new(&imp) {
                Ok(task) => {
                    let first = task.first_run(now);
                    plugin.add_task(TaskKind::Collector(task), first);
                }
                Err(e) => warn!(plugin = %imp.name(), error = %e, "cannot queue collector"),
            }
        }

        info!(plugin = %imp.name(), "Plugin activated");
    }

    /// Last item gone: cancel the plugin's tasks and stop it.
    pub(crate) fn deactivate_plugin(&mut self, pid: PluginId, now: DateTime<Utc>) {
        self.watchers.remove(&pid);
        self.exporters.retain(|_, task| task.plugin() != pid);

        let plugin = &mut self.plugins[pid.index()];
        // a start that never ran needs no stop
        let never_started = plugin
            .find_pending(|k| matches!(k, TaskKind::Starter(_)))
            .is_some();
        let cancelled = plugin.deactivate_all();
        plugin.set_active(false);

        if plugin.imp().runner().is_some() && !never_started {
            match StopperTask::new(plugin.imp()) {
                Ok(task) => {
                    plugin.add_task(TaskKind::Stopper(task), now);
                }
                Err(e) => warn!(plugin = %plugin.name(), error = %e, "cannot queue stopper"),
            }
        }

        info!(plugin = %plugin.name(), cancelled, "Plugin deactivated");
    }

    /// Cancel all item work, queue stops for active plugins, and arm the
    /// drain deadline.
    pub(crate) fn begin_shutdown(&mut self, now: DateTime<Utc>) {
        if self.shutdown_deadline.is_some() {
            return;
        }
        info!(
            in_flight = self.in_flight(),
            timeout_secs = self.config.shutdown_timeout_secs,
            "Scheduler shutdown requested"
        );
        self.shutdown_deadline = Some(Instant::now() + self.config.shutdown_timeout());

        for index in 0..self.plugins.len() {
            if self.plugins[index].is_active() {
                let pid = self.plugins[index].id();
                self.deactivate_plugin(pid, now);
            }
        }
        self.exporters.clear();
        self.watchers.clear();
    }
}
