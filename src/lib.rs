//! longhaul — phase-budgeted executor for long-running agent tasks.
//!
//! Long, autonomous, network-paced agent tasks have to survive on hosts
//! that hard-kill any invocation exceeding a compute ceiling. longhaul
//! makes such tasks restartable instead of fragile:
//!
//! - **Budgets**: each phase (plan, work, review) gets a wall-clock
//!   allotment sized below the host's kill threshold; a guard aborts work
//!   proactively instead of letting the host kill mid-write.
//! - **Checkpoints**: every pause persists the full task state, so a fresh
//!   invocation continues exactly where the last one stopped.
//! - **Bounded loops**: one phase of agent work is a tool-calling loop with
//!   its own iteration and time limits.
//! - **Watchdog**: a periodic trigger resumes paused tasks and is the sole
//!   owner of the resume counter.
//!
//! # Quick Start
//!
//! ```ignore
//! use longhaul::{Config, GatewayClient, TaskExecutor};
//!
//! let config = Config::load(None)?;
//! let executor = TaskExecutor::new(config, model, tools, store, callbacks);
//! let state = executor.submit("Add dark mode", None).await?;
//! executor.run(&state.task_id).await?;
//! ```

// ─── Core ──────────────────────────────────────────────────────────
pub mod budget;
pub mod executor;
pub mod state;
pub mod store;
pub mod watchdog;

// ─── Collaborators ─────────────────────────────────────────────────
pub mod api;
pub mod callbacks;
pub mod tools;

// ─── Infrastructure ────────────────────────────────────────────────
pub mod cli;
pub mod config;
pub mod errors;
pub mod testing;

pub use api::{GatewayClient, ModelClient};
pub use budget::{BudgetExceeded, PhaseBudgets};
pub use callbacks::{LogSink, StatusSink};
pub use config::Config;
pub use errors::{LonghaulError, Result};
pub use executor::TaskExecutor;
pub use state::{Phase, TaskState, TaskStatus};
pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use watchdog::Watchdog;
