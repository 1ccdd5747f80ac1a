use std::sync::Arc;

use agentd_core::{Capability, Runner};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::SchedulerError;
use crate::plugin::PluginImpl;
use crate::task::{FinishGuard, Performer};
use crate::types::{Priority, WeightClass};

/// One-shot `start` call issued when a runner plugin becomes active.
pub struct StarterTask {
    plugin: Arc<str>,
    runner: Arc<dyn Runner>,
}

impl StarterTask {
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

impl Performer for StarterTask {
    fn priority(&self) -> Priority {
        Priority::Starter
    }

    fn weight_class(&self) -> WeightClass {
        WeightClass::PluginCapacity
    }

    fn perform(&self, guard: FinishGuard) {
        let runner = Arc::clone(&self.runner);
        let plugin = Arc::clone(&self.plugin);
        tokio::spawn(async move {
            let _guard = guard;
            runner.start().await;
            info!(plugin = %plugin, "plugin started");
        });
    }

    fn reschedule(&self, _scheduled: DateTime<Utc>, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::task::TaskId;
    use crate::test_support::{MockPlugin, RecordingFinisher, full_impl, plugin_id};

    #[test]
    fn requires_runner_capability() {
        let imp = PluginImpl::new("bare").with_metric("bare.key");
        assert!(matches!(
            StarterTask::new(&imp),
            Err(SchedulerError::MissingCapability { capability: Capability::Runner, .. })
        ));
    }

    #[tokio::test]
    async fn starts_once_and_does_not_recur() {
        let mock = MockPlugin::new();
        let task = StarterTask::new(&full_impl("mock", &mock)).unwrap();
        let (finisher, mut done) = RecordingFinisher::new();
        let id = TaskId::new(plugin_id(0), 1);

        task.perform(FinishGuard::new(finisher, id));

        assert_eq!(done.recv().await, Some(id));
        assert_eq!(mock.starts.load(Ordering::SeqCst), 1);
        assert!(task.reschedule(Utc::now(), Utc::now()).is_none());
    }
}
