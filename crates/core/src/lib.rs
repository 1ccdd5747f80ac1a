pub mod config;
pub mod error;
pub mod itemutil;
pub mod plugin;
pub mod result;

pub use config::AgentConfig;
pub use error::*;
pub use itemutil::{NextcheckPolicy, Value, get_nextcheck, parse_delay, parse_key};
pub use plugin::{Capability, Collector, Exporter, Request, Runner, Watcher};
pub use result::{ChannelWriter, ItemResult, Outcome, ResultWriter};
