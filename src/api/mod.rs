//! Model-serving collaborator.
//!
//! [`ModelClient`] is the abstract seam the executor talks through;
//! [`GatewayClient`] is the shipped implementation speaking the
//! OpenAI-compatible `/chat/completions` wire format. The client does not
//! retry failed calls: a hard failure surfaces to the tool-calling loop,
//! which ends the phase.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

pub mod types;

use crate::config::Config;
use crate::errors::ApiError;
use types::{ApiErrorBody, ChatRequest, ChatResponse, Message, ToolDefinition};

/// Trait abstraction over the model-serving API, enabling test mocking.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Send one chat completion round-trip.
    async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse>;
}

pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_tokens: usize,
    temperature: f32,
}

impl GatewayClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("LONGHAUL_API_KEY").ok())
            .context("No API key configured (set api_key or LONGHAUL_API_KEY)")?;

        // Request timeout with a 60s floor; slow models need headroom.
        let request_timeout = config.request_timeout_secs.max(60);
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Construct a client against an explicit endpoint, bypassing config.
    /// Used by tests that point at a local mock gateway.
    pub fn with_endpoint(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_tokens: 4096,
            temperature: 0.7,
        })
    }
}

#[async_trait]
impl ModelClient for GatewayClient {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ChatResponse> {
        let has_tools = tools.is_some();
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools,
            tool_choice: has_tools.then(|| "auto".to_string()),
        };

        debug!(model, "sending chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::Error::from(ApiError::Timeout)
                } else {
                    anyhow::Error::from(ApiError::Network(e.to_string()))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::Parse(e.to_string()))?;

        if parsed.choices.is_empty() {
            return Err(ApiError::EmptyResponse.into());
        }

        Ok(parsed)
    }
}
