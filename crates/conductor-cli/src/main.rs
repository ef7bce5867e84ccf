//! The `conductor` binary: runs the orchestrator (and optionally a demo
//! worker) in one process over the in-memory bus.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use conductor_agent::{AgentHandler, AgentRuntime, AgentRuntimeConfig};
use conductor_bus::InMemoryBus;
use conductor_core::{AgentType, ConductorResult, HealthSnapshot, Task};
use conductor_orchestrator::{Orchestrator, OrchestratorConfig};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conductor", about = "Conductor — multi-agent task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conductor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator until interrupted
    Run {
        /// Also start a demo generator agent and submit one demo task
        #[arg(long)]
        demo: bool,
    },
}

#[derive(Deserialize, Default)]
struct ConductorConfig {
    #[serde(default)]
    orchestrator: OrchestratorConfig,
    #[serde(default)]
    agent: AgentRuntimeConfig,
}

fn load_config(path: &Path) -> anyhow::Result<ConductorConfig> {
    if !path.exists() {
        info!(path = %path.display(), "No config file; using defaults");
        return Ok(ConductorConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

/// Demo worker: completes every generator task by echoing its payload.
struct EchoGenerator;

#[async_trait]
impl AgentHandler for EchoGenerator {
    fn capabilities(&self) -> Vec<String> {
        vec!["echo".to_string()]
    }

    fn validate_task(&self, task: &Task) -> bool {
        task.task_kind == "echo"
    }

    async fn process_task(&self, task: Task) -> ConductorResult<serde_json::Value> {
        Ok(json!({"echo": task.payload}))
    }

    async fn health_check(&self) -> HealthSnapshot {
        HealthSnapshot {
            cpu_usage: 5.0,
            memory_usage: 0.1,
            ..HealthSnapshot::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run { demo } => run(config, demo).await,
    }
}

async fn run(config: ConductorConfig, demo: bool) -> anyhow::Result<()> {
    let bus = Arc::new(InMemoryBus::new());
    let orchestrator = Orchestrator::new(bus.clone(), config.orchestrator);
    orchestrator.start().await?;

    let mut demo_runtime = None;
    if demo {
        let runtime = AgentRuntime::new(
            "demo-generator-1",
            AgentType::Generator,
            Arc::new(EchoGenerator),
            bus.clone(),
            config.agent,
        );
        runtime.start().await?;

        let task = Task::new(AgentType::Generator, "echo", json!({"hello": "conductor"}));
        orchestrator
            .submit_task_with_callback(task, |done| {
                info!(task_id = %done.id, result = ?done.result, "Demo task completed");
            })
            .await?;

        demo_runtime = Some(runtime);
    }

    info!("Conductor running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    let health = orchestrator.system_health().await;
    info!(agents = ?health.agents, "Shutting down");

    if let Some(runtime) = demo_runtime {
        runtime.stop().await;
    }
    orchestrator.stop().await;
    Ok(())
}
