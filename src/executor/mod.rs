//! The task state machine.
//!
//! [`TaskExecutor`] owns a task's lifecycle across phases (plan, work,
//! review), drives the tool-calling loop within each phase, and reacts to
//! a budget-exceeded signal by persisting a checkpoint and ending the
//! invocation cleanly instead of crashing. Controlled outcomes — complete,
//! paused, failed — are returned as state; only infrastructure failures
//! (checkpoint store I/O) surface as errors.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod plan;
pub mod tool_loop;

use crate::api::types::{Message, Usage};
use crate::api::ModelClient;
use crate::budget::BudgetGuard;
use crate::callbacks::{StatusSink, StatusUpdate};
use crate::config::Config;
use crate::errors::{self, Result, TaskError};
use crate::state::{Phase, TaskState, TaskStatus};
use crate::store::CheckpointStore;
use crate::tools::ToolRegistry;
use tool_loop::{LoopLimits, LoopOutcome, ToolLoop};

/// How one phase step ended, from the state machine's point of view.
/// An iteration or time limit is a normal outcome, handled exactly like a
/// budget signal: checkpoint and pause.
enum StepOutcome {
    Done,
    LimitHit,
}

pub struct TaskExecutor {
    config: Config,
    model: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn CheckpointStore>,
    callbacks: Arc<dyn StatusSink>,
}

impl TaskExecutor {
    pub fn new(
        config: Config,
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn CheckpointStore>,
        callbacks: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            config,
            model,
            tools,
            store,
            callbacks,
        }
    }

    /// Create and persist a new task in the queued state.
    pub async fn submit(&self, prompt: &str, model_alias: Option<&str>) -> Result<TaskState> {
        let alias = model_alias.unwrap_or(&self.config.model).to_string();
        let slug = plan::slugify(prompt);
        let suffix = Uuid::new_v4().simple().to_string();
        let task_id = if slug.is_empty() {
            format!("task-{}", &suffix[..8])
        } else {
            format!("{}-{}", slug, &suffix[..8])
        };

        let state = TaskState::new(task_id, prompt, alias);
        self.store.put(&state).await?;
        info!(task_id = %state.task_id, model = %state.model, "task submitted");
        self.post_status(&state, Some("task submitted")).await;
        Ok(state)
    }

    /// Drive a task from its persisted phase until it completes, pauses,
    /// or fails. Serves both the first invocation and every resume; the
    /// resume counter is owned by the watchdog and never written here.
    pub async fn run(&self, task_id: &str) -> Result<TaskState> {
        let mut state = self
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| TaskError::NotFound {
                task_id: task_id.to_string(),
            })?;

        if state.status.is_terminal() {
            return Err(TaskError::AlreadyTerminal {
                task_id: task_id.to_string(),
                status: state.status.to_string(),
            }
            .into());
        }

        state.status = TaskStatus::Running;
        state.touch();
        self.store.put(&state).await?;
        info!(
            task_id = %state.task_id,
            phase = %state.phase,
            resumes = state.auto_resume_count,
            "task invocation started"
        );

        loop {
            let phase = state.phase;
            // Each phase (and each resumed invocation of one) starts a
            // fresh clock; the budgets are sized for a single invocation's
            // view of the phase.
            let phase_started = Instant::now();

            match self.run_phase(&mut state, phase_started).await {
                Ok(StepOutcome::Done) => {
                    state.error = None;
                    match phase.next() {
                        Some(next) => {
                            info!(task_id = %state.task_id, from = %phase, to = %next, "phase complete");
                            state.phase = next;
                            state.conversation.clear();
                            state.touch();
                            self.store.put(&state).await?;
                            self.post_status(&state, Some("phase complete")).await;
                        }
                        None => {
                            state.status = TaskStatus::Complete;
                            state.touch();
                            self.store.put(&state).await?;
                            info!(task_id = %state.task_id, tokens = state.tokens_used, "task complete");
                            self.post_status(&state, Some("task complete")).await;
                            return Ok(state);
                        }
                    }
                }
                Ok(StepOutcome::LimitHit) => {
                    info!(task_id = %state.task_id, phase = %phase, "loop limits hit, pausing");
                    return self.pause(state).await;
                }
                Err(e) => {
                    if let Some(signal) = errors::budget_exceeded(&e) {
                        warn!(task_id = %state.task_id, %signal, "pausing");
                        // Checkpoint and yield. The resume counter is not
                        // touched here; only the watchdog increments it.
                        return self.pause(state).await;
                    }
                    warn!(
                        task_id = %state.task_id,
                        phase = %phase,
                        error = %format!("{:#}", e),
                        "phase failed"
                    );
                    state.status = TaskStatus::Failed;
                    state.error = Some(format!("{:#}", e));
                    state.touch();
                    self.store.put(&state).await?;
                    self.post_status(&state, None).await;
                    return Ok(state);
                }
            }
        }
    }

    async fn pause(&self, mut state: TaskState) -> Result<TaskState> {
        state.status = TaskStatus::Paused;
        state.touch();
        self.store.put(&state).await?;
        self.post_status(&state, Some("checkpoint saved, awaiting resume"))
            .await;
        Ok(state)
    }

    async fn run_phase(
        &self,
        state: &mut TaskState,
        phase_started: Instant,
    ) -> anyhow::Result<StepOutcome> {
        match state.phase {
            Phase::Plan => self.run_plan(state, phase_started).await,
            Phase::Work => self.run_work(state, phase_started).await,
            Phase::Review => self.run_review(state, phase_started).await,
        }
    }

    /// One bounded tool-calling exchange against the task's conversation.
    /// Usage is recorded even when the loop is cut short by a budget
    /// signal, since the conversation mutations survive either way.
    async fn drive_loop(
        &self,
        state: &mut TaskState,
        phase_started: Instant,
    ) -> anyhow::Result<LoopOutcome> {
        let spec = self.config.resolve_model(&state.model);
        let guard = BudgetGuard::new(&self.config.budgets, state.phase, phase_started);
        let tool_loop = ToolLoop::new(self.model.as_ref(), self.tools.as_ref());
        let limits = LoopLimits::from_config(&self.config.agent);

        let mut usage = Usage::default();
        let result = tool_loop
            .run(
                &spec.id,
                &mut state.conversation,
                &mut usage,
                &limits,
                Some(&guard),
            )
            .await;
        state.record_usage(&usage, spec.estimate_cost(&usage));
        result
    }

    async fn run_plan(
        &self,
        state: &mut TaskState,
        phase_started: Instant,
    ) -> anyhow::Result<StepOutcome> {
        if state.conversation.is_empty() {
            state
                .conversation
                .push(Message::system(plan::plan_system_prompt()));
            state
                .conversation
                .push(Message::user(format!("Task:\n{}", state.prompt)));
        }

        let outcome = self.drive_loop(state, phase_started).await?;
        if outcome.hit_limit {
            return Ok(StepOutcome::LimitHit);
        }

        let text = outcome.final_text.unwrap_or_default();
        let work_plan = plan::parse_plan_result(&text).unwrap_or_else(|| {
            warn!(
                task_id = %state.task_id,
                "plan answer had no parsable result block, falling back to a single work item"
            );
            plan::fallback_plan(&state.prompt)
        });
        info!(task_id = %state.task_id, items = work_plan.items.len(), "plan ready");
        state.plan = Some(work_plan);
        Ok(StepOutcome::Done)
    }

    async fn run_work(
        &self,
        state: &mut TaskState,
        phase_started: Instant,
    ) -> anyhow::Result<StepOutcome> {
        let work_plan = state.plan.clone().ok_or_else(|| TaskError::PhaseFailed {
            phase: state.phase.to_string(),
            message: "work phase entered without a recorded plan".to_string(),
        })?;

        if state.conversation.is_empty() {
            state
                .conversation
                .push(Message::system(plan::work_system_prompt()));
            let notes = work_plan
                .notes
                .as_deref()
                .map(|n| format!("\nPlan notes: {}", n))
                .unwrap_or_default();
            state.conversation.push(Message::user(format!(
                "Task:\n{}\n\nPlan \"{}\" with items: {}.{}",
                state.prompt,
                work_plan.title,
                work_plan.items.join(", "),
                notes
            )));
        }

        for item in &work_plan.items {
            if state.completed_items.contains(item) {
                debug!(task_id = %state.task_id, item = %item, "work item already complete, skipping");
                continue;
            }

            state.conversation.push(Message::user(format!(
                "Work item: {}\nComplete this item now, then reply with a short summary.",
                item
            )));

            let outcome = self.drive_loop(state, phase_started).await?;
            if outcome.hit_limit {
                return Ok(StepOutcome::LimitHit);
            }

            state.completed_items.insert(item.clone());
            state.touch();
            self.store.put(state).await?;
            info!(
                task_id = %state.task_id,
                item = %item,
                done = state.completed_items.len(),
                total = work_plan.items.len(),
                "work item complete"
            );
        }

        Ok(StepOutcome::Done)
    }

    async fn run_review(
        &self,
        state: &mut TaskState,
        phase_started: Instant,
    ) -> anyhow::Result<StepOutcome> {
        if state.conversation.is_empty() {
            state
                .conversation
                .push(Message::system(plan::review_system_prompt()));
            let title = state
                .plan
                .as_ref()
                .map(|p| p.title.clone())
                .unwrap_or_else(|| "untitled".to_string());
            let completed: Vec<String> = state.completed_items.iter().cloned().collect();
            state.conversation.push(Message::user(format!(
                "Task:\n{}\n\nPlan \"{}\" finished these items: {}.",
                state.prompt,
                title,
                completed.join(", ")
            )));
        }

        let outcome = self.drive_loop(state, phase_started).await?;
        if outcome.hit_limit {
            return Ok(StepOutcome::LimitHit);
        }
        Ok(StepOutcome::Done)
    }

    async fn post_status(&self, state: &TaskState, message: Option<&str>) {
        let update = StatusUpdate {
            task_id: state.task_id.clone(),
            status: state.status,
            phase: state.phase,
            message: message.map(String::from),
            error: state.error.clone(),
        };
        // Status callbacks are best effort and never fail the task.
        if let Err(e) = self.callbacks.post(&update).await {
            warn!(task_id = %state.task_id, error = %format!("{:#}", e), "status callback failed");
        }
    }
}
