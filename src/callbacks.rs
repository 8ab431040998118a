//! Status callback sink.
//!
//! Tasks report lifecycle changes to an external listener. Delivery is
//! best effort with a small bounded retry; a callback failure is logged
//! and never fails the task.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::state::{Phase, TaskStatus};

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn post(&self, update: &StatusUpdate) -> Result<()>;
}

/// Sink that only logs. The default when no callback URL is configured.
#[derive(Default)]
pub struct LogSink;

#[async_trait]
impl StatusSink for LogSink {
    async fn post(&self, update: &StatusUpdate) -> Result<()> {
        info!(
            task_id = %update.task_id,
            status = %update.status,
            phase = %update.phase,
            message = update.message.as_deref().unwrap_or(""),
            "status update"
        );
        Ok(())
    }
}

/// Sink that POSTs JSON to a callback URL, optionally with a bearer secret.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build callback HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
            secret,
        })
    }
}

#[async_trait]
impl StatusSink for HttpSink {
    async fn post(&self, update: &StatusUpdate) -> Result<()> {
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self.client.post(&self.url).json(update);
            if let Some(secret) = &self.secret {
                request = request.bearer_auth(secret);
            }
            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => {
                    last_error = Some(format!("callback returned {}", response.status()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }
            if attempt < MAX_ATTEMPTS {
                warn!(attempt, url = %self.url, "status callback failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
        }
        anyhow::bail!(
            "status callback failed after {} attempts: {}",
            MAX_ATTEMPTS,
            last_error.unwrap_or_default()
        )
    }
}
