use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

/// Either a rendered value or an error message, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Value(String),
    Error(String),
}

/// A single item result delivered to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub itemid: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ItemResult {
    pub fn value(itemid: u64, ts: DateTime<Utc>, value: impl Into<String>) -> Self {
        Self {
            itemid,
            ts,
            outcome: Outcome::Value(value.into()),
        }
    }

    pub fn error(itemid: u64, ts: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            itemid,
            ts,
            outcome: Outcome::Error(message.into()),
        }
    }

    pub fn as_value(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Value(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            Outcome::Value(_) => None,
        }
    }
}

/// Destination for item results. Writes must not block.
pub trait ResultWriter: Send + Sync {
    fn write(&self, result: ItemResult);
}

/// Blanket implementation so `Arc<dyn ResultWriter>` can be used directly.
impl<T: ResultWriter + ?Sized> ResultWriter for Arc<T> {
    fn write(&self, result: ItemResult) {
        (**self).write(result)
    }
}

/// Forwards results into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<ItemResult>,
}

impl ChannelWriter {
    /// Create a writer together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ItemResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultWriter for ChannelWriter {
    fn write(&self, result: ItemResult) {
        if self.tx.send(result).is_err() {
            tracing::debug!("result receiver dropped, discarding result");
        }
    }
}
