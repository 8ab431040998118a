//! Deterministic test doubles for the executor's collaborators.
//!
//! [`ScriptedModelClient`] is an in-process [`ModelClient`] that serves a
//! queue of canned responses; [`mock_api`] provides a loopback HTTP server
//! for exercising the real [`crate::api::GatewayClient`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub mod mock_api;

use crate::api::types::{
    ChatResponse, Choice, Message, ToolCall, ToolDefinition, ToolFunction, Usage,
};
use crate::api::ModelClient;
use crate::errors::ApiError;
use crate::tools::Tool;

/// A canned tool call for scripted responses.
#[derive(Debug, Clone)]
pub struct ScriptedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One canned model response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Text(String),
    ToolCalls(Vec<ScriptedToolCall>),
    Error(String),
}

/// In-process [`ModelClient`] serving responses in FIFO order. When the
/// queue is exhausted it falls back to a default text answer. Every request
/// conversation is recorded for assertions.
pub struct ScriptedModelClient {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    recorded: Mutex<Vec<Vec<Message>>>,
    default_text: String,
    latency: Duration,
}

impl Default for ScriptedModelClient {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            recorded: Mutex::new(Vec::new()),
            default_text: "All done.".to_string(),
            latency: Duration::ZERO,
        }
    }
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.responses
            .try_lock()
            .expect("builder used before sharing")
            .push_back(ScriptedResponse::Text(text.into()));
        self
    }

    pub fn tool_calls(self, calls: Vec<ScriptedToolCall>) -> Self {
        self.responses
            .try_lock()
            .expect("builder used before sharing")
            .push_back(ScriptedResponse::ToolCalls(calls));
        self
    }

    pub fn error(self, message: impl Into<String>) -> Self {
        self.responses
            .try_lock()
            .expect("builder used before sharing")
            .push_back(ScriptedResponse::Error(message.into()));
        self
    }

    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of completion requests served so far.
    pub async fn call_count(&self) -> usize {
        self.recorded.lock().await.len()
    }

    /// Conversations exactly as they arrived, one per request.
    pub async fn recorded_conversations(&self) -> Vec<Vec<Message>> {
        self.recorded.lock().await.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
        _tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.recorded.lock().await.push(messages);

        let next = self.responses.lock().await.pop_front();
        let message = match next {
            Some(ScriptedResponse::Text(text)) => Message::assistant(text),
            Some(ScriptedResponse::ToolCalls(calls)) => Message::assistant_tool_calls(
                None,
                calls
                    .into_iter()
                    .map(|c| ToolCall {
                        id: c.id,
                        call_type: "function".to_string(),
                        function: ToolFunction {
                            name: c.name,
                            arguments: c.arguments,
                        },
                    })
                    .collect(),
            ),
            Some(ScriptedResponse::Error(message)) => {
                return Err(ApiError::HttpStatus {
                    status: 500,
                    message,
                }
                .into());
            }
            None => Message::assistant(self.default_text.clone()),
        };

        Ok(ChatResponse {
            id: "scripted-resp".to_string(),
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        })
    }
}

/// Tool that records every invocation and returns a fixed value.
pub struct RecordingTool {
    name: String,
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl RecordingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records arguments and returns ok"
    }

    fn schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        self.calls.lock().await.push(args);
        Ok(serde_json::json!({"ok": true}))
    }
}
