use std::sync::Arc;

use agentd_core::{Capability, Request, ResultWriter, Watcher};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::SchedulerError;
use crate::plugin::PluginImpl;
use crate::task::{FinishGuard, Performer};
use crate::types::{Priority, WeightClass};

/// Hands a watcher plugin the full set of items it should report on.
///
/// One watcher task is queued per plugin per item update. The task does not
/// recur; the next update replaces the request set.
pub struct WatcherTask {
    plugin: Arc<str>,
    watcher: Arc<dyn Watcher>,
    requests: Vec<Request>,
    sink: Arc<dyn ResultWriter>,
}

impl WatcherTask {
    pub fn new(
        imp: &PluginImpl,
        requests: Vec<Request>,
        sink: Arc<dyn ResultWriter>,
    ) -> Result<Self, SchedulerError> {
        let watcher = imp
            .watcher()
            .cloned()
            .ok_or_else(|| imp.missing(Capability::Watcher))?;
        Ok(Self {
            plugin: imp.name_arc(),
            watcher,
            requests,
            sink,
        })
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }
}

impl Performer for WatcherTask {
    fn priority(&self) -> Priority {
        Priority::Watcher
    }

    fn weight_class(&self) -> WeightClass {
        WeightClass::PluginCapacity
    }

    fn perform(&self, guard: FinishGuard) {
        let watcher = Arc::clone(&self.watcher);
        let sink = Arc::clone(&self.sink);
        let requests = self.requests.clone();
        let plugin = Arc::clone(&self.plugin);
        tokio::spawn(async move {
            let _guard = guard;
            debug!(plugin = %plugin, requests = requests.len(), "updating watch requests");
            watcher.watch(&requests, sink).await;
        });
    }

    fn reschedule(&self, _scheduled: DateTime<Utc>, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use agentd_core::ChannelWriter;

    use super::*;
    use crate::task::TaskId;
    use crate::test_support::{MockPlugin, RecordingFinisher, full_impl, plugin_id};

    #[tokio::test]
    async fn hands_requests_to_watcher() {
        let mock = MockPlugin::new();
        let (writer, _rx) = ChannelWriter::channel();
        let requests = vec![
            Request { itemid: 1, key: "mock.trap".into() },
            Request { itemid: 2, key: "mock.trap[b]".into() },
        ];
        let task = WatcherTask::new(&full_impl("mock", &mock), requests.clone(), Arc::new(writer)).unwrap();
        let (finisher, mut done) = RecordingFinisher::new();
        let id = TaskId::new(plugin_id(0), 2);

        task.perform(FinishGuard::new(finisher, id));

        assert_eq!(done.recv().await, Some(id));
        assert_eq!(mock.watched(), vec![requests]);
        assert!(task.reschedule(Utc::now(), Utc::now()).is_none());
    }
}
