use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::api::types::Usage;
use crate::budget::PhaseBudgets;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Root directory the workspace tools operate in.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Checkpoint directory; defaults to `~/.longhaul/tasks` when unset.
    pub checkpoint_dir: Option<PathBuf>,

    pub callback_url: Option<String>,
    pub callback_secret: Option<String>,

    #[serde(default = "default_models")]
    pub models: HashMap<String, ModelSpec>,

    #[serde(default)]
    pub budgets: PhaseBudgets,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

/// A model the gateway can serve: alias → wire id plus pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    /// Dollars per million prompt tokens.
    #[serde(default)]
    pub input_per_million: f64,
    /// Dollars per million completion tokens.
    #[serde(default)]
    pub output_per_million: f64,
}

impl ModelSpec {
    pub fn estimate_cost(&self, usage: &Usage) -> f64 {
        let input = usage.prompt_tokens as f64 * self.input_per_million / 1_000_000.0;
        let output = usage.completion_tokens as f64 * self.output_per_million / 1_000_000.0;
        input + output
    }
}

/// Bounds for the tool-calling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_loop_ms")]
    pub max_loop_ms: u64,
    #[serde(default = "default_tool_buffer_ms")]
    pub tool_buffer_ms: u64,
}

/// Resume trigger cadence and policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// A paused task is only resumed once its checkpoint is at least this
    /// old.
    #[serde(default = "default_min_backoff_secs")]
    pub min_backoff_secs: u64,
    /// Tasks resumed this many times are failed instead of resumed again,
    /// guaranteeing eventual termination.
    #[serde(default = "default_max_auto_resumes")]
    pub max_auto_resumes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            workspace_root: default_workspace_root(),
            checkpoint_dir: None,
            callback_url: None,
            callback_secret: None,
            models: default_models(),
            budgets: PhaseBudgets::default(),
            agent: AgentConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_loop_ms: default_max_loop_ms(),
            tool_buffer_ms: default_tool_buffer_ms(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            min_backoff_secs: default_min_backoff_secs(),
            max_auto_resumes: default_max_auto_resumes(),
        }
    }
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_model() -> String {
    "deepseek".to_string()
}
fn default_max_tokens() -> usize {
    4096
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout() -> u64 {
    120
}
fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_max_iterations() -> usize {
    10
}
fn default_max_loop_ms() -> u64 {
    120_000
}
fn default_tool_buffer_ms() -> u64 {
    5_000
}
fn default_poll_interval_secs() -> u64 {
    30
}
fn default_min_backoff_secs() -> u64 {
    60
}
fn default_max_auto_resumes() -> u32 {
    10
}

fn default_models() -> HashMap<String, ModelSpec> {
    let mut models = HashMap::new();
    models.insert(
        "deepseek".to_string(),
        ModelSpec {
            id: "deepseek/deepseek-chat".to_string(),
            input_per_million: 0.30,
            output_per_million: 1.20,
        },
    );
    models.insert(
        "qwen".to_string(),
        ModelSpec {
            id: "qwen/qwen3-coder".to_string(),
            input_per_million: 0.35,
            output_per_million: 1.50,
        },
    );
    models.insert(
        "kimi".to_string(),
        ModelSpec {
            id: "moonshotai/kimi-k2".to_string(),
            input_per_million: 0.55,
            output_per_million: 2.20,
        },
    );
    models
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p))?;
                toml::from_str(&content).context("Failed to parse config")?
            }
            None => {
                let default_paths = ["longhaul.toml", "~/.config/longhaul/config.toml"];
                let mut loaded = None;
                for p in &default_paths {
                    if let Ok(content) = std::fs::read_to_string(p) {
                        loaded =
                            Some(toml::from_str(&content).context("Failed to parse config")?);
                        break;
                    }
                }
                loaded.unwrap_or_default()
            }
        };
        Ok(config)
    }

    /// Validate invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        self.budgets
            .validate()
            .map_err(|msg| anyhow::anyhow!(msg))?;
        if self.agent.max_iterations == 0 {
            anyhow::bail!("agent.max_iterations must be at least 1");
        }
        Ok(())
    }

    /// Resolve a model alias to its spec. Unknown aliases pass through as
    /// raw model ids with no pricing, so direct ids still work.
    pub fn resolve_model(&self, alias: &str) -> ModelSpec {
        self.models.get(alias).cloned().unwrap_or(ModelSpec {
            id: alias.to_string(),
            input_per_million: 0.0,
            output_per_million: 0.0,
        })
    }
}
