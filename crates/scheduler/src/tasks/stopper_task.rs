use std::sync::Arc;

use agentd_core::{Capability, Runner};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::SchedulerError;
use crate::plugin::PluginImpl;
use crate::task::{FinishGuard, Performer};
use crate::types::{Priority, WeightClass};

/// One-shot `stop` call issued when a runner plugin is released.
pub struct StopperTask {
    plugin: Arc<str>,
    runner: Arc<dyn Runner>,
}

impl StopperTask {
    pub fn new(imp: &PluginImpl) -> Result<Self, SchedulerError> {
        let runner = imp
            .runner()
            .cloned()
            .ok_or_else(|| imp.missing(Capability::Runner))?;
        Ok(Self {
            plugin: imp.name_arc(),
            runner,
        })
    }
}

impl Performer for StopperTask {
    fn priority(&self) -> Priority {
        Priority::Stopper
    }

    fn weight_class(&self) -> WeightClass {
        WeightClass::PluginCapacity
    }

    fn perform(&self, guard: FinishGuard) {
        let runner = Arc::clone(&self.runner);
        let plugin = Arc::clone(&self.plugin);
        tokio::spawn(async move {
            let _guard = guard;
            runner.stop().await;
            info!(plugin = %plugin, "plugin stopped");
        });
    }

    fn reschedule(&self, _scheduled: DateTime<Utc>, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}
