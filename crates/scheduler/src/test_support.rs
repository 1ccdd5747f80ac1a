//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agentd_core::{
    Collector, Exporter, ItemResult, PluginError, Request, ResultWriter, Runner, Value, Watcher,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::plugin::PluginImpl;
use crate::task::{Finisher, PluginId, TaskId};

/// Plugin implementing every capability and counting calls.
pub(crate) struct MockPlugin {
    period: u32,
    collect_error: Option<String>,
    export_result: Result<Value, PluginError>,
    pub collects: AtomicUsize,
    pub exports: AtomicUsize,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    last_export: Mutex<Option<(String, Vec<String>)>>,
    watched: Mutex<Vec<Vec<Request>>>,
}

impl MockPlugin {
    fn build(period: u32, collect_error: Option<String>, export_result: Result<Value, PluginError>) -> Arc<Self> {
        Arc::new(Self {
            period,
            collect_error,
            export_result,
            collects: AtomicUsize::new(0),
            exports: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            last_export: Mutex::new(None),
            watched: Mutex::new(Vec::new()),
        })
    }

    pub fn new() -> Arc<Self> {
        Self::build(60, None, Ok(Value::from(1i64)))
    }

    pub fn with_period(period: u32) -> Arc<Self> {
        Self::build(period, None, Ok(Value::from(1i64)))
    }

    pub fn failing_collect(message: &str) -> Arc<Self> {
        Self::build(60, Some(message.to_string()), Ok(Value::from(1i64)))
    }

    pub fn exporting(result: Result<Value, PluginError>) -> Arc<Self> {
        Self::build(60, None, result)
    }

    pub fn export_calls(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }

    pub fn last_export(&self) -> Option<(String, Vec<String>)> {
        self.last_export.lock().unwrap().clone()
    }

    pub fn watched(&self) -> Vec<Vec<Request>> {
        self.watched.lock().unwrap().clone()
    }
}

#[async_trait]
impl Collector for MockPlugin {
    async fn collect(&self) -> Result<(), PluginError> {
        self.collects.fetch_add(1, Ordering::SeqCst);
        match &self.collect_error {
            Some(message) => Err(PluginError::Failed(message.clone())),
            None => Ok(()),
        }
    }

    fn period(&self) -> u32 {
        self.period
    }
}

#[async_trait]
impl Exporter for MockPlugin {
    async fn export(&self, key: &str, params: &[String]) -> Result<Value, PluginError> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        *self.last_export.lock().unwrap() = Some((key.to_string(), params.to_vec()));
        self.export_result.clone()
    }
}

#[async_trait]
impl Runner for MockPlugin {
    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Watcher for MockPlugin {
    async fn watch(&self, requests: &[Request], sink: Arc<dyn ResultWriter>) {
        for request in requests {
            sink.write(ItemResult::value(request.itemid, Utc::now(), "watched"));
        }
        self.watched.lock().unwrap().push(requests.to_vec());
    }
}

/// All four capabilities, serving `<name>.value`.
pub(crate) fn full_impl(name: &str, mock: &Arc<MockPlugin>) -> PluginImpl {
    PluginImpl::new(name)
        .with_metric(format!("{name}.value"))
        .with_collector(mock.clone())
        .with_exporter(mock.clone())
        .with_runner(mock.clone())
        .with_watcher(mock.clone())
}

/// Exporter only, serving `<name>.value`.
pub(crate) fn exporter_impl(name: &str, mock: &Arc<MockPlugin>) -> PluginImpl {
    PluginImpl::new(name)
        .with_metric(format!("{name}.value"))
        .with_exporter(mock.clone())
}

/// Watcher only, serving `<name>.trap`.
pub(crate) fn watcher_impl(name: &str, mock: &Arc<MockPlugin>) -> PluginImpl {
    PluginImpl::new(name)
        .with_metric(format!("{name}.trap"))
        .with_watcher(mock.clone())
}

/// Finisher that forwards completions to a channel.
pub(crate) struct RecordingFinisher {
    tx: mpsc::UnboundedSender<TaskId>,
}

impl RecordingFinisher {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TaskId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl Finisher for RecordingFinisher {
    fn finish_task(&self, task: TaskId) {
        let _ = self.tx.send(task);
    }
}

pub(crate) fn plugin_id(index: usize) -> PluginId {
    PluginId(index)
}
