//! agent-scheduler — runs the plugin scheduler with built-in plugins.
//!
//! Reads an item list from TOML, schedules it against the built-in `agent`
//! and `heartbeat` plugins, and prints every result as a JSON line on stdout.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use agentd_core::config::{env_or, load_dotenv};
use agentd_core::{AgentConfig, ChannelWriter, Collector, Exporter, PluginError, Runner, Value};
use agentd_scheduler::{ItemRequest, PluginImpl, Scheduler, SchedulerConfig};

// ── CLI ─────────────────────────────────────────────────────────────

/// Plugin task scheduler with built-in demo plugins.
#[derive(Parser, Debug)]
#[command(name = "agent-scheduler", version, about)]
struct Cli {
    /// Path to the TOML item list.
    #[arg(long, env = "AGENT_ITEMS", default_value = "config/items.toml")]
    items: String,

    /// Path to a scheduler.toml config file. Defaults come from AGENT_* env vars.
    #[arg(long, env = "AGENT_SCHEDULER_CONFIG")]
    config: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    run_for: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ItemFile {
    #[serde(default)]
    items: Vec<ItemRequest>,
}

fn load_items(path: impl AsRef<Path>) -> anyhow::Result<Vec<ItemRequest>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading item list {}", path.display()))?;
    let file: ItemFile = toml::from_str(&text)
        .with_context(|| format!("parsing item list {}", path.display()))?;
    Ok(file.items)
}

// ── agent plugin ────────────────────────────────────────────────────

/// Static facts about the agent itself.
struct AgentPlugin {
    hostname: String,
}

#[async_trait]
impl Exporter for AgentPlugin {
    async fn export(&self, key: &str, params: &[String]) -> Result<Value, PluginError> {
        if params.iter().any(|p| !p.is_empty()) {
            return Err(PluginError::InvalidParams("too many parameters".to_string()));
        }
        match key {
            "agent.ping" => Ok(Value::from(1i64)),
            "agent.version" => Ok(Value::from(env!("CARGO_PKG_VERSION"))),
            "agent.hostname" => Ok(Value::from(self.hostname.as_str())),
            _ => Err(PluginError::UnsupportedKey),
        }
    }
}

fn agent_plugin() -> PluginImpl {
    PluginImpl::new("agent")
        .with_metrics(["agent.ping", "agent.version", "agent.hostname"])
        .with_exporter(Arc::new(AgentPlugin {
            hostname: env_or("HOSTNAME", "localhost"),
        }))
}

// ── heartbeat plugin ────────────────────────────────────────────────

const HEARTBEAT_HISTORY: usize = 3;

/// Collects a beat every period and exports the count and recent beats.
struct HeartbeatPlugin {
    period: u32,
    beats: AtomicU64,
    recent: Mutex<VecDeque<String>>,
}

#[async_trait]
impl Collector for HeartbeatPlugin {
    async fn collect(&self) -> Result<(), PluginError> {
        self.beats.fetch_add(1, Ordering::Relaxed);
        let mut recent = self
            .recent
            .lock()
            .map_err(|_| PluginError::Failed("heartbeat history poisoned".to_string()))?;
        if recent.len() == HEARTBEAT_HISTORY {
            recent.pop_front();
        }
        recent.push_back(Utc::now().to_rfc3339());
        Ok(())
    }

    fn period(&self) -> u32 {
        self.period
    }
}

#[async_trait]
impl Exporter for HeartbeatPlugin {
    async fn export(&self, key: &str, _params: &[String]) -> Result<Value, PluginError> {
        match key {
            "heartbeat.count" => Ok(Value::from(self.beats.load(Ordering::Relaxed))),
            "heartbeat.recent" => {
                let recent = self
                    .recent
                    .lock()
                    .map_err(|_| PluginError::Failed("heartbeat history poisoned".to_string()))?;
                Ok(Value::from(recent.iter().cloned().collect::<Vec<String>>()))
            }
            _ => Err(PluginError::UnsupportedKey),
        }
    }
}

#[async_trait]
impl Runner for HeartbeatPlugin {
    async fn start(&self) {
        info!(period = self.period, "heartbeat started");
    }

    async fn stop(&self) {
        info!(beats = self.beats.load(Ordering::Relaxed), "heartbeat stopped");
    }
}

fn heartbeat_plugin() -> PluginImpl {
    let plugin = Arc::new(HeartbeatPlugin {
        period: 5,
        beats: AtomicU64::new(0),
        recent: Mutex::new(VecDeque::with_capacity(HEARTBEAT_HISTORY)),
    });
    PluginImpl::new("heartbeat")
        .with_metrics(["heartbeat.count", "heartbeat.recent"])
        .with_collector(plugin.clone())
        .with_exporter(plugin.clone())
        .with_runner(plugin)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let agent = AgentConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&agent.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    agent.log_summary();

    let config = match &cli.config {
        Some(path) => {
            let config = SchedulerConfig::from_file(path)?;
            info!(path = %path, "loaded scheduler config");
            config
        }
        None => SchedulerConfig::from(&agent),
    };
    let items = load_items(&cli.items)?;
    info!(path = %cli.items, count = items.len(), "loaded item list");

    let mut scheduler = Scheduler::new(config);
    scheduler.register_plugin(agent_plugin(), None)?;
    scheduler.register_plugin(heartbeat_plugin(), Some(2))?;
    let handle = scheduler.handle();

    let (writer, mut results) = ChannelWriter::channel();
    let printer = tokio::spawn(async move {
        while let Some(result) = results.recv().await {
            match serde_json::to_string(&result) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to serialize result"),
            }
        }
    });

    handle.update_items(Arc::new(writer), items)?;
    let run = tokio::spawn(scheduler.run());

    match cli.run_for {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c().await?,
    }

    handle.shutdown()?;
    let metrics = run.await?;
    info!(metrics = %serde_json::to_string(&metrics)?, "agent-scheduler exited cleanly");
    printer.abort();
    Ok(())
}
