//! Command-line harness around the executor.
//!
//! The core is a library; this surface only wires the collaborators
//! together: gateway client, workspace tools, file-backed checkpoint
//! store, and (optionally) an HTTP status sink.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::api::GatewayClient;
use crate::callbacks::{HttpSink, LogSink, StatusSink};
use crate::config::Config;
use crate::executor::TaskExecutor;
use crate::state::{TaskState, TaskStatus};
use crate::store::{CheckpointStore, FileCheckpointStore};
use crate::tools::ToolRegistry;
use crate::watchdog::Watchdog;

#[derive(Parser)]
#[command(name = "longhaul", about = "Phase-budgeted executor for long-running agent tasks")]
struct Cli {
    /// Path to a config file (defaults to longhaul.toml when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a new task and run it until it completes, pauses, or fails
    Start {
        /// The task description
        prompt: String,
        /// Model alias from the config's model table
        #[arg(long)]
        model: Option<String>,
    },
    /// Continue a paused task in this invocation (does not count as an
    /// automatic resume)
    Resume { task_id: String },
    /// Run the watchdog: periodically resume paused tasks
    Watch,
    /// List all known tasks
    List,
    /// Show the full state of one task
    Show { task_id: String },
}

pub async fn run() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    let store: Arc<dyn CheckpointStore> = Arc::new(match &config.checkpoint_dir {
        Some(dir) => FileCheckpointStore::new(dir.clone())?,
        None => FileCheckpointStore::default_path()?,
    });

    match cli.command {
        Command::Start { prompt, model } => {
            let executor = build_executor(config, Arc::clone(&store))?;
            let state = executor.submit(&prompt, model.as_deref()).await?;
            println!("{} {}", "submitted".bright_cyan(), state.task_id);
            let state = executor.run(&state.task_id).await?;
            print_outcome(&state);
        }
        Command::Resume { task_id } => {
            let executor = build_executor(config, Arc::clone(&store))?;
            let state = executor.run(&task_id).await?;
            print_outcome(&state);
        }
        Command::Watch => {
            let watchdog_config = config.watchdog.clone();
            let executor = Arc::new(build_executor(config, Arc::clone(&store))?);
            let watchdog = Watchdog::new(store, executor, watchdog_config);
            tokio::select! {
                _ = watchdog.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("\n{}", "watchdog stopped".bright_yellow());
                }
            }
        }
        Command::List => {
            for state in store.list().await? {
                println!(
                    "{:<40} {:>8} {:>7} resumes={} ${:.4}",
                    state.task_id,
                    status_label(state.status),
                    state.phase.to_string(),
                    state.auto_resume_count,
                    state.cost_estimate,
                );
            }
        }
        Command::Show { task_id } => {
            let state = store
                .get(&task_id)
                .await?
                .with_context(|| format!("no such task: {}", task_id))?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
    }

    Ok(())
}

fn build_executor(config: Config, store: Arc<dyn CheckpointStore>) -> Result<TaskExecutor> {
    let model = Arc::new(GatewayClient::new(&config)?);
    let tools = Arc::new(ToolRegistry::with_builtins(config.workspace_root.clone()));
    let callbacks: Arc<dyn StatusSink> = match &config.callback_url {
        Some(url) => Arc::new(HttpSink::new(url.clone(), config.callback_secret.clone())?),
        None => Arc::new(LogSink),
    };
    Ok(TaskExecutor::new(config, model, tools, store, callbacks))
}

fn print_outcome(state: &TaskState) {
    let line = format!(
        "{} task {} (phase {}, {} tokens, ${:.4})",
        status_label(state.status),
        state.task_id,
        state.phase,
        state.tokens_used,
        state.cost_estimate,
    );
    println!("{}", line);
    if let Some(error) = &state.error {
        println!("{} {}", "error:".bright_red(), error);
    }
    if state.status == TaskStatus::Paused {
        println!(
            "resume with: {}",
            format!("longhaul resume {}", state.task_id).bright_white()
        );
    }
}

fn status_label(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Complete => "complete".bright_green(),
        TaskStatus::Failed => "failed".bright_red(),
        TaskStatus::Paused => "paused".bright_yellow(),
        TaskStatus::Running => "running".bright_cyan(),
        TaskStatus::Queued => "queued".normal(),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("longhaul=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
