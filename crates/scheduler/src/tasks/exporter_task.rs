use std::sync::Arc;

use agentd_core::itemutil::MAX_DELAY;
use agentd_core::{
    Capability, DelayError, Exporter, ItemResult, NextcheckPolicy, PluginError, ResultWriter, parse_key,
};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use crate::error::SchedulerError;
use crate::plugin::PluginImpl;
use crate::task::{FinishGuard, Performer};
use crate::types::{Item, Priority};

/// On-demand fetch of a single item. Recurs on the item's check schedule
/// until the item is removed.
pub struct ExporterTask {
    exporter: Arc<dyn Exporter>,
    writer: Arc<dyn ResultWriter>,
    item: Item,
    policy: NextcheckPolicy,
}

impl ExporterTask {
    pub fn new(
        imp: &PluginImpl,
        item: Item,
        writer: Arc<dyn ResultWriter>,
        policy: NextcheckPolicy,
    ) -> Result<Self, SchedulerError> {
        let exporter = imp
            .exporter()
            .cloned()
            .ok_or_else(|| imp.missing(Capability::Exporter))?;
        Ok(Self {
            exporter,
            writer,
            item,
            policy,
        })
    }

    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Replace the target item and sink. Work already in flight is unaffected.
    pub(crate) fn update(&mut self, item: Item, writer: Arc<dyn ResultWriter>) {
        self.item = item;
        self.writer = writer;
    }

    pub fn first_run(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, DelayError> {
        self.policy
            .nextcheck(self.item.itemid, &self.item.delay, self.item.unsupported, now)
    }
}

/// Parse the key, export, and render the returned value into result strings.
async fn export_values(exporter: &dyn Exporter, item_key: &str) -> Result<Vec<String>, PluginError> {
    let (key, params) = parse_key(item_key)?;
    let value = exporter.export(&key, &params).await?;
    Ok(value.into_strings())
}

impl Performer for ExporterTask {
    fn priority(&self) -> Priority {
        Priority::Exporter
    }

    fn perform(&self, guard: FinishGuard) {
        let exporter = Arc::clone(&self.exporter);
        let writer = Arc::clone(&self.writer);
        let itemid = self.item.itemid;
        let item_key = self.item.key.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let now = Utc::now();
            match export_values(exporter.as_ref(), &item_key).await {
                Ok(values) => {
                    for value in values {
                        writer.write(ItemResult::value(itemid, now, value));
                    }
                }
                Err(e) => writer.write(ItemResult::error(itemid, now, e.to_string())),
            }
        });
    }

    fn reschedule(&self, _scheduled: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.first_run(now) {
            Ok(next) => Some(next),
            Err(e) => {
                warn!(itemid = self.item.itemid, error = %e, "cannot compute next check, retrying later");
                let retry = self.policy.refresh_unsupported.clamp(1, MAX_DELAY);
                now.checked_add_signed(TimeDelta::seconds(retry as i64))
            }
        }
    }
}
