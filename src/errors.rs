use std::path::PathBuf;
use thiserror::Error;

use crate::budget::BudgetExceeded;

/// The central error type for the longhaul system.
///
/// This hierarchy enables programmatic recovery and unified error handling
/// across the executor, API, tool, and storage layers.
#[derive(Error, Debug)]
pub enum LonghaulError {
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task '{task_id}' not found in checkpoint store")]
    NotFound { task_id: String },

    #[error("Task '{task_id}' is already terminal ({status})")]
    AlreadyTerminal { task_id: String, status: String },

    #[error("Phase {phase} failed: {message}")]
    PhaseFailed { phase: String, message: String },

    #[error("Auto-resume limit reached ({limit} resumes)")]
    ResumeLimit { limit: u32 },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request timed out")]
    Timeout,

    #[error("API returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model returned no choices")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool '{name}' failed: {message}")]
    Execution { name: String, message: String },

    #[error("Tool '{name}' failed fatally: {message}")]
    Fatal { name: String, message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to save checkpoint for task '{task_id}': {message}")]
    Save { task_id: String, message: String },

    #[error("Failed to load checkpoint for task '{task_id}': {message}")]
    Load { task_id: String, message: String },

    #[error("Checkpoint for task '{task_id}' is corrupt: {message}")]
    Corrupt { task_id: String, message: String },

    #[error("Storage error at {path:?}: {message}")]
    Storage { path: PathBuf, message: String },

    #[error("Invalid task id '{task_id}'")]
    InvalidTaskId { task_id: String },
}

pub type Result<T> = std::result::Result<T, LonghaulError>;

/// Recover the typed budget signal from an anyhow error chain.
///
/// The tool-calling loop propagates [`BudgetExceeded`] through anyhow; the
/// state machine uses this to distinguish the pause-and-checkpoint path
/// from a genuine phase failure.
pub fn budget_exceeded(e: &anyhow::Error) -> Option<&BudgetExceeded> {
    e.downcast_ref::<BudgetExceeded>()
}

/// Check whether an anyhow error carries a fatal tool failure.
pub fn is_fatal_tool_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<ToolError>(),
        Some(ToolError::Fatal { .. })
    )
}
