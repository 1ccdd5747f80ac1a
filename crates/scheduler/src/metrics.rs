use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics. Written only by the scheduling loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Completed executions by task kind.
    pub tasks_executed: HashMap<String, u64>,
    /// Average execution time by task kind.
    pub avg_task_duration: HashMap<String, Duration>,
    /// Completions reported for tasks that were not running.
    pub ignored_completions: u64,
    /// Tasks waiting in plugin queues.
    pub tasks_pending: usize,
    /// Tasks currently executing.
    pub tasks_in_flight: usize,
    /// Plugins serving at least one item.
    pub active_plugins: usize,
    /// Last time the queue was scanned.
    pub last_tick: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    /// Record a task execution.
    pub fn record_execution(&mut self, kind: &str, duration: Duration) {
        let count = {
            let count = self.tasks_executed.entry(kind.to_string()).or_default();
            *count += 1;
            *count
        };

        let prev_avg = self.avg_task_duration.get(kind).copied().unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_task_duration.insert(kind.to_string(), new_avg);
    }

    pub fn executions(&self, kind: &str) -> u64 {
        self.tasks_executed.get(kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("collector", Duration::from_millis(100));

        assert_eq!(m.executions("collector"), 1);
        assert_eq!(m.avg_task_duration["collector"], Duration::from_millis(100));
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_execution("exporter", Duration::from_millis(100));
        m.record_execution("exporter", Duration::from_millis(200));

        assert_eq!(m.executions("exporter"), 2);
        let avg = m.avg_task_duration["exporter"].as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.ignored_completions, 0);
        assert_eq!(m.executions("starter"), 0);
        assert!(m.last_tick.is_none());
    }
}
