//! Resume trigger.
//!
//! A scheduled wake-up mechanism independent of task invocations: it scans
//! the checkpoint store for paused tasks whose last checkpoint is older
//! than a minimum backoff, increments the resume counter, and re-invokes
//! the executor at the persisted phase. This module is the single
//! authoritative owner of `auto_resume_count` — the executor's own
//! budget-exceeded handling never touches it, so one stall is never
//! charged as two resumes.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::errors::TaskError;
use crate::executor::TaskExecutor;
use crate::state::TaskStatus;
use crate::store::CheckpointStore;

pub struct Watchdog {
    store: Arc<dyn CheckpointStore>,
    executor: Arc<TaskExecutor>,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        executor: Arc<TaskExecutor>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// One scan over the store. Returns the ids of tasks that were
    /// re-invoked this cycle.
    pub async fn tick(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let backoff = chrono::Duration::seconds(self.config.min_backoff_secs as i64);
        let mut resumed = Vec::new();

        for mut state in self.store.list().await? {
            // Only paused tasks are eligible; a running task already has
            // an invocation holding it, and terminal tasks stay put.
            if state.status != TaskStatus::Paused {
                continue;
            }

            let age = now.signed_duration_since(state.updated_at);
            if age < backoff {
                debug!(task_id = %state.task_id, "paused task is within backoff, skipping");
                continue;
            }

            if state.auto_resume_count >= self.config.max_auto_resumes {
                let err = TaskError::ResumeLimit {
                    limit: self.config.max_auto_resumes,
                };
                warn!(task_id = %state.task_id, %err, "failing task");
                state.status = TaskStatus::Failed;
                state.error = Some(err.to_string());
                state.touch();
                self.store.put(&state).await?;
                continue;
            }

            // The single authoritative increment: exactly once per resume
            // cycle, before the executor is re-entered.
            state.auto_resume_count += 1;
            state.status = TaskStatus::Running;
            state.touch();
            self.store.put(&state).await?;
            info!(
                task_id = %state.task_id,
                phase = %state.phase,
                resumes = state.auto_resume_count,
                "resuming paused task"
            );

            if let Err(e) = self.executor.run(&state.task_id).await {
                warn!(
                    task_id = %state.task_id,
                    error = %format!("{:#}", e),
                    "resumed invocation failed"
                );
            }
            resumed.push(state.task_id);
        }

        Ok(resumed)
    }

    /// Drive [`tick`](Self::tick) on a fixed cadence, forever. The caller
    /// decides when to stop (typically on a shutdown signal).
    pub async fn run(&self) {
        let period = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "watchdog started");

        loop {
            interval.tick().await;
            match self.tick().await {
                Ok(resumed) if !resumed.is_empty() => {
                    info!(count = resumed.len(), "watchdog resumed tasks");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %format!("{:#}", e), "watchdog tick failed"),
            }
        }
    }
}
