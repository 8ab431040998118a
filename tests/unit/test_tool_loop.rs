use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use longhaul::api::types::{Message, Usage};
use longhaul::budget::{BudgetGuard, PhaseBudgets};
use longhaul::errors::{budget_exceeded, is_fatal_tool_error, ToolError};
use longhaul::executor::tool_loop::{LoopLimits, ToolLoop};
use longhaul::state::Phase;
use longhaul::testing::{RecordingTool, ScriptedModelClient, ScriptedToolCall};
use longhaul::tools::{Tool, ToolRegistry};

fn limits(max_iterations: usize, max_time: Duration) -> LoopLimits {
    LoopLimits {
        max_iterations,
        max_time,
        tool_buffer: Duration::from_millis(0),
    }
}

fn tool_call(name: &str) -> ScriptedToolCall {
    ScriptedToolCall {
        id: "call_1".to_string(),
        name: name.to_string(),
        arguments: "{}".to_string(),
    }
}

struct Flaky;

#[async_trait]
impl Tool for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "Always reports an expected failure"
    }
    fn schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value) -> Result<Value> {
        Err(anyhow::anyhow!("disk is on fire (expected)"))
    }
}

struct Catastrophic;

#[async_trait]
impl Tool for Catastrophic {
    fn name(&self) -> &str {
        "catastrophic"
    }
    fn description(&self) -> &str {
        "Fails fatally"
    }
    fn schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value) -> Result<Value> {
        Err(ToolError::Fatal {
            name: "catastrophic".to_string(),
            message: "backing service unreachable".to_string(),
        }
        .into())
    }
}

#[tokio::test]
async fn test_tool_call_then_final_answer() {
    let client = ScriptedModelClient::new()
        .tool_calls(vec![tool_call("probe")])
        .text("Work is finished.");
    let mut registry = ToolRegistry::new();
    registry.register(RecordingTool::new("probe"));

    let tool_loop = ToolLoop::new(&client, &registry);
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let outcome = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(10, Duration::from_secs(30)),
            None,
        )
        .await
        .expect("loop");

    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.tools_used, vec!["probe".to_string()]);
    assert!(!outcome.hit_limit);
    assert_eq!(outcome.final_text.as_deref(), Some("Work is finished."));
    // user, assistant tool-call, tool result, assistant final
    assert_eq!(conversation.len(), 4);
    assert_eq!(conversation[1].role, "assistant");
    assert_eq!(conversation[2].role, "tool");
    assert_eq!(conversation[3].role, "assistant");
    assert_eq!(usage.total_tokens, 30);
}

#[tokio::test]
async fn test_iteration_cap_reports_limit() {
    let client = ScriptedModelClient::new().tool_calls(vec![tool_call("probe")]);
    let mut registry = ToolRegistry::new();
    registry.register(RecordingTool::new("probe"));

    let tool_loop = ToolLoop::new(&client, &registry);
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let outcome = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(1, Duration::from_secs(30)),
            None,
        )
        .await
        .expect("loop");

    assert_eq!(outcome.iterations, 1);
    assert!(outcome.hit_limit);
    assert!(outcome.final_text.is_none());
    assert_eq!(outcome.tools_used.len(), 1);
}

#[tokio::test]
async fn test_time_ceiling_reports_limit_before_further_iterations() {
    let client = ScriptedModelClient::new()
        .with_latency(Duration::from_millis(500))
        .tool_calls(vec![tool_call("probe")]);
    let mut registry = ToolRegistry::new();
    registry.register(RecordingTool::new("probe"));

    let tool_loop = ToolLoop::new(&client, &registry);
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let outcome = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(10, Duration::from_millis(100)),
            None,
        )
        .await
        .expect("loop");

    assert!(outcome.hit_limit);
    assert_eq!(outcome.iterations, 1);
    // The buffer check fires before any tool executes.
    assert!(outcome.tools_used.is_empty());
}

#[tokio::test]
async fn test_budget_signal_propagates_typed() {
    let budgets = PhaseBudgets {
        review_ms: 5,
        plan_ms: 10,
        work_ms: 20,
    };
    let client = ScriptedModelClient::new()
        .with_latency(Duration::from_millis(100))
        .tool_calls(vec![tool_call("probe")]);
    let mut registry = ToolRegistry::new();
    let probe = RecordingTool::new("probe");
    let probe_calls = probe.calls.clone();
    registry.register(probe);

    let tool_loop = ToolLoop::new(&client, &registry);
    let guard = BudgetGuard::new(&budgets, Phase::Work, Instant::now());
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let err = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(10, Duration::from_secs(30)),
            Some(&guard),
        )
        .await
        .expect_err("budget must signal");

    let signal = budget_exceeded(&err).expect("typed signal");
    assert_eq!(signal.phase, Phase::Work);
    assert_eq!(signal.budget_ms, 20);
    assert!(signal.elapsed_ms > 20);
    // The guard fires before the tool executes, never after.
    assert!(probe_calls.lock().await.is_empty());
    // Conversation progress and usage survive the abort.
    assert_eq!(conversation.last().expect("messages").role, "assistant");
    assert_eq!(usage.total_tokens, 15);
}

#[tokio::test]
async fn test_expected_tool_failure_is_folded_not_retried() {
    let client = ScriptedModelClient::new()
        .tool_calls(vec![tool_call("flaky")])
        .text("Adapted to the failure.");
    let mut registry = ToolRegistry::new();
    registry.register(Flaky);

    let tool_loop = ToolLoop::new(&client, &registry);
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let outcome = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(10, Duration::from_secs(30)),
            None,
        )
        .await
        .expect("loop");

    assert!(!outcome.hit_limit);
    assert_eq!(outcome.tools_used, vec!["flaky".to_string()]);
    let tool_message = conversation
        .iter()
        .find(|m| m.role == "tool")
        .expect("tool result present");
    assert!(tool_message.text().starts_with("Error:"));
    assert_eq!(
        outcome.final_text.as_deref(),
        Some("Adapted to the failure.")
    );
}

#[tokio::test]
async fn test_fatal_tool_failure_ends_the_loop() {
    let client = ScriptedModelClient::new().tool_calls(vec![tool_call("catastrophic")]);
    let mut registry = ToolRegistry::new();
    registry.register(Catastrophic);

    let tool_loop = ToolLoop::new(&client, &registry);
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let err = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(10, Duration::from_secs(30)),
            None,
        )
        .await
        .expect_err("fatal tool failure propagates");

    assert!(is_fatal_tool_error(&err));
}

#[tokio::test]
async fn test_model_failure_propagates() {
    let client = ScriptedModelClient::new().error("model service unavailable");
    let registry = ToolRegistry::new();

    let tool_loop = ToolLoop::new(&client, &registry);
    let mut conversation = vec![Message::user("go")];
    let mut usage = Usage::default();
    let err = tool_loop
        .run(
            "m",
            &mut conversation,
            &mut usage,
            &limits(10, Duration::from_secs(30)),
            None,
        )
        .await
        .expect_err("model failure propagates");

    assert!(err.to_string().contains("model service unavailable"));
    assert!(budget_exceeded(&err).is_none());
}
