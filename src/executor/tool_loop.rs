//! The bounded tool-calling loop.
//!
//! Drives one exchange between the model and the tool registry: send the
//! conversation, execute any requested tools, feed the results back,
//! repeat. Bounded by an iteration cap and a wall-clock ceiling of its
//! own, and by the phase budget guard when one is supplied. A failing
//! tool call is folded into the conversation as a tool-result message so
//! the model can adapt; it is never re-executed blindly.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::api::types::{Message, Usage};
use crate::api::ModelClient;
use crate::budget::BudgetGuard;
use crate::config::AgentConfig;
use crate::tools::ToolRegistry;

/// Bounds for one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopLimits {
    pub max_iterations: usize,
    pub max_time: Duration,
    /// Time reserved before executing tools, so a slow tool does not push
    /// the loop past its own deadline mid-execution.
    pub tool_buffer: Duration,
}

impl LoopLimits {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            max_time: Duration::from_millis(config.max_loop_ms),
            tool_buffer: Duration::from_millis(config.tool_buffer_ms),
        }
    }
}

/// How one loop invocation ended.
///
/// The three termination causes are reported distinctly: a final answer
/// (`final_text` is `Some`, `hit_limit` is false), the iteration cap, or
/// the time ceiling (both leave `final_text` as the last text seen, if
/// any, with `hit_limit` true).
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub final_text: Option<String>,
    pub tools_used: Vec<String>,
    pub iterations: usize,
    pub hit_limit: bool,
}

pub struct ToolLoop<'a> {
    model: &'a dyn ModelClient,
    tools: &'a ToolRegistry,
}

impl<'a> ToolLoop<'a> {
    pub fn new(model: &'a dyn ModelClient, tools: &'a ToolRegistry) -> Self {
        Self { model, tools }
    }

    /// Run the loop until a final answer or a limit.
    ///
    /// The conversation is extended in place so progress survives even
    /// when a budget signal aborts the loop; token usage accumulates into
    /// `usage` the same way. A [`crate::budget::BudgetExceeded`] from the
    /// guard and fatal model/tool failures propagate as errors; iteration
    /// and time limits are normal outcomes.
    pub async fn run(
        &self,
        model: &str,
        conversation: &mut Vec<Message>,
        usage: &mut Usage,
        limits: &LoopLimits,
        guard: Option<&BudgetGuard<'_>>,
    ) -> Result<LoopOutcome> {
        let started = Instant::now();
        let mut iterations = 0usize;
        let mut tools_used = Vec::new();
        let mut hit_limit = false;
        let mut final_text: Option<String> = None;

        let definitions = if self.tools.is_empty() {
            None
        } else {
            Some(self.tools.definitions())
        };

        while iterations < limits.max_iterations {
            if started.elapsed() > limits.max_time {
                hit_limit = true;
                break;
            }
            if let Some(guard) = guard {
                guard.check()?;
            }

            iterations += 1;
            debug!(iteration = iterations, "model round-trip");

            let response = self
                .model
                .complete(model, conversation.clone(), definitions.clone())
                .await?;
            usage.add(&response.usage);

            let choice = response
                .choices
                .into_iter()
                .next()
                .context("model returned no choices")?;
            let mut message = choice.message;

            let calls = message.tool_calls.take().unwrap_or_default();
            if calls.is_empty() {
                // Final answer: no further tool calls.
                let text = message.text().to_string();
                conversation.push(Message::assistant(text.clone()));
                final_text = Some(text);
                break;
            }

            // Reserve the buffer before committing to tool execution.
            if started.elapsed() + limits.tool_buffer >= limits.max_time {
                hit_limit = true;
                break;
            }

            conversation.push(Message::assistant_tool_calls(
                message.content.clone(),
                calls.clone(),
            ));

            // Sequential execution, in the order the model requested.
            for call in &calls {
                if let Some(guard) = guard {
                    guard.check()?;
                }
                tools_used.push(call.function.name.clone());
                let result = self.tools.dispatch(call).await?;
                if result.content.starts_with("Error:") {
                    warn!(tool = %call.function.name, "tool reported a failure");
                }
                conversation.push(Message::tool(result.content, result.tool_call_id));
            }
        }

        if iterations >= limits.max_iterations && final_text.is_none() {
            hit_limit = true;
        }

        Ok(LoopOutcome {
            final_text,
            tools_used,
            iterations,
            hit_limit,
        })
    }
}
