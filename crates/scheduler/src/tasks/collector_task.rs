use std::sync::Arc;

use agentd_core::{Capability, Collector};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::error::SchedulerError;
use crate::plugin::PluginImpl;
use crate::task::{FinishGuard, Performer};
use crate::types::{Priority, WeightClass};

/// Periodic collection trigger. Occupies the whole plugin capacity while
/// running, which serializes collection cycles.
pub struct CollectorTask {
    plugin: Arc<str>,
    collector: Arc<dyn Collector>,
}

impl CollectorTask {
    pub fn new(imp: &PluginImpl) -> Result<Self, SchedulerError> {
        let collector = imp
            .collector()
            .cloned()
            .ok_or_else(|| imp.missing(Capability::Collector))?;
        Ok(Self {
            plugin: imp.name_arc(),
            collector,
        })
    }

    /// Collection period in seconds, never less than one.
    pub fn period(&self) -> u32 {
        self.collector.period().max(1)
    }

    /// First run after activation: the next period boundary after `now`.
    pub fn first_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = i64::from(self.period());
        let next = (now.timestamp().div_euclid(period) + 1) * period;
        DateTime::<Utc>::from_timestamp(next, 0).unwrap_or(now)
    }
}

impl Performer for CollectorTask {
    fn priority(&self) -> Priority {
        Priority::Collector
    }

    fn weight_class(&self) -> WeightClass {
        WeightClass::PluginCapacity
    }

    fn perform(&self, guard: FinishGuard) {
        let collector = Arc::clone(&self.collector);
        let plugin = Arc::clone(&self.plugin);
        tokio::spawn(async move {
            let _guard = guard;
            match collector.collect().await {
                Ok(()) => debug!(plugin = %plugin, "collection finished"),
                Err(e) => warn!(plugin = %plugin, error = %e, "collector failed"),
            }
        });
    }

    fn reschedule(&self, scheduled: DateTime<Utc>, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Some(scheduled + TimeDelta::seconds(i64::from(self.period())))
    }
}
