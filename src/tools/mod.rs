//! Tool-execution collaborator.
//!
//! Tools are the model's hands. Expected failures (unknown tool, bad
//! arguments, a tool returning an error) are folded into the result content
//! so the model can adapt within the same loop iteration; only a failure a
//! tool marks as fatal propagates and ends the phase.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

pub mod file;

use crate::api::types::{FunctionDefinition, ToolCall, ToolDefinition};
use crate::errors::ToolError;
use file::{FileList, FileRead, FileWrite};

/// A tool the model can invoke. Each tool has a name, description, JSON
/// schema for its arguments, and an async `execute` method.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Result of one tool invocation, used only to extend the conversation.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
}

/// Name-keyed registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in workspace tools, rooted at the
    /// given directory.
    pub fn with_builtins(workspace_root: PathBuf) -> Self {
        let mut registry = Self::new();
        registry.register(FileRead::new(workspace_root.clone()));
        registry.register(FileWrite::new(workspace_root.clone()));
        registry.register(FileList::new(workspace_root));
        registry
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in the wire format the model expects.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                def_type: "function".to_string(),
                function: FunctionDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: tool.schema(),
                },
            })
            .collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Execute one tool call requested by the model.
    ///
    /// Never errors for expected failures: those come back as `Ok` with the
    /// failure described in the content. Only [`ToolError::Fatal`]
    /// propagates.
    pub async fn dispatch(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let name = &call.function.name;
        debug!(tool = %name, "dispatching tool call");

        let tool = match self.get(name) {
            Some(tool) => tool,
            None => {
                return Ok(ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Error: unknown tool '{}'", name),
                });
            }
        };

        let args: Value = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Error: invalid arguments for '{}': {}", name, e),
                });
            }
        };

        match tool.execute(args).await {
            Ok(value) => {
                let content = match value {
                    Value::String(s) => s,
                    other => serde_json::to_string(&other)
                        .unwrap_or_else(|e| format!("Error: unserializable tool result: {}", e)),
                };
                Ok(ToolResult {
                    tool_call_id: call.id.clone(),
                    content,
                })
            }
            Err(e) => match e.downcast::<ToolError>() {
                Ok(fatal @ ToolError::Fatal { .. }) => Err(fatal),
                Ok(expected) => Ok(ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Error: {}", expected),
                }),
                Err(e) => Ok(ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!("Error: {:#}", e),
                }),
            },
        }
    }
}
