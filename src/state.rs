//! Durable task state.
//!
//! [`TaskState`] is the unit of durable progress: everything a fresh
//! invocation needs to continue a task exactly where the last one stopped.
//! It is written to the checkpoint store as a whole record and never
//! patched field-by-field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::api::types::{Message, Usage};

/// A named stage of task execution with its own time budget and
/// conversation scope. Exactly one phase is active at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Work,
    Review,
}

impl Phase {
    /// The phase that follows this one, or `None` after review.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Plan => Some(Phase::Work),
            Phase::Work => Some(Phase::Review),
            Phase::Review => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Work => "work",
            Phase::Review => "review",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Paused,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Parsed output of the plan phase. Its items are the work units the work
/// phase executes in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkPlan {
    pub title: String,
    pub items: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A complete snapshot of task progress, sufficient to resume execution
/// from the exact point of interruption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub prompt: String,
    pub model: String,
    pub phase: Phase,
    pub status: TaskStatus,

    /// Conversation for the active phase. Append-only within a phase;
    /// reset at phase transitions (the parsed plan carries forward what
    /// the next phase needs).
    pub conversation: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<WorkPlan>,

    /// Work-unit ids already finished. Re-execution after a resume skips
    /// everything in this set.
    pub completed_items: BTreeSet<String>,

    /// Monotonically non-decreasing counters, accumulated across resumes.
    pub tokens_used: u64,
    pub cost_estimate: f64,

    /// Number of times the watchdog has restarted this task. Incremented
    /// by the watchdog exactly once per resume cycle, and by no one else.
    pub auto_resume_count: u32,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Last fatal or recoverable error, cleared on successful phase advance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskState {
    /// Create state for a freshly submitted task.
    pub fn new(
        task_id: impl Into<String>,
        prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            prompt: prompt.into(),
            model: model.into(),
            phase: Phase::Plan,
            status: TaskStatus::Queued,
            conversation: Vec::new(),
            plan: None,
            completed_items: BTreeSet::new(),
            tokens_used: 0,
            cost_estimate: 0.0,
            auto_resume_count: 0,
            started_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// Refresh the checkpoint timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Accumulate token usage and its estimated cost.
    pub fn record_usage(&mut self, usage: &Usage, cost: f64) {
        self.tokens_used += usage.total_tokens as u64;
        self.cost_estimate += cost;
    }

    /// Plan items not yet completed, in plan order.
    pub fn pending_items(&self) -> Vec<String> {
        match &self.plan {
            Some(plan) => plan
                .items
                .iter()
                .filter(|item| !self.completed_items.contains(*item))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}
