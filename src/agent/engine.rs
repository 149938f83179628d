//! Reasoning engines: turn a prompt plus optional history into text, calling
//! the agent's tools along the way.

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::LlmConfig;
use crate::credentials::Credential;

use super::context::Context;
use super::core::Agent;
use super::llm::{ChatModel, LlmClient};

/// Per-request options
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    /// Replay prior exchanges and record this one
    pub use_history: bool,
    pub max_iterations: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for RequestParams {
    fn default() -> Self {
        RequestParams {
            use_history: true,
            max_iterations: 10,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl RequestParams {
    pub fn from_config(config: &LlmConfig) -> Self {
        RequestParams {
            use_history: config.use_history,
            max_iterations: config.max_iterations,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// An engine attached to one agent
#[async_trait]
pub trait Engine: Send + Sync {
    async fn generate(&self, prompt: &str, params: &RequestParams) -> Result<String>;

    /// Number of recorded history messages
    async fn history_len(&self) -> usize;

    async fn clear_history(&self);
}

/// Produces engines for agents
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn attach(&self, agent: Arc<Agent>, credential: &Credential) -> Result<Arc<dyn Engine>>;
}

/// Tool-calling loop over a chat model, keeping the conversation history
pub struct AugmentedLlm {
    agent: Arc<Agent>,
    model: Arc<dyn ChatModel>,
    history: Mutex<Context>,
    max_tool_calls: usize,
}

impl AugmentedLlm {
    pub fn new(agent: Arc<Agent>, model: Arc<dyn ChatModel>, max_tool_calls: usize) -> Self {
        let history = Mutex::new(Context::new(agent.instruction()));
        AugmentedLlm {
            agent,
            model,
            history,
            max_tool_calls,
        }
    }
}

#[async_trait]
impl Engine for AugmentedLlm {
    async fn generate(&self, prompt: &str, params: &RequestParams) -> Result<String> {
        let mut history = self.history.lock().await;
        let mut working = if params.use_history {
            history.clone()
        } else {
            history.fresh()
        };
        working.add_user(prompt);

        let tools = self.agent.tools();
        let tools = if tools.is_empty() { None } else { Some(tools) };

        for iteration in 1..=params.max_iterations {
            log::debug!(
                "{}: iteration {}/{}",
                self.agent.name(),
                iteration,
                params.max_iterations
            );

            let reply = self
                .model
                .complete(&working.messages(), tools, params)
                .await?;

            let tool_calls = match reply.tool_calls {
                Some(calls) if !calls.is_empty() => calls,
                _ => {
                    let answer = reply.content.unwrap_or_default();
                    working.add_assistant(&answer, None);
                    if params.use_history {
                        *history = working;
                    }
                    return Ok(answer);
                }
            };

            if tool_calls.len() > self.max_tool_calls {
                let warning = format!(
                    "Requested {} tool calls at once (limit {}); please use fewer per step.",
                    tool_calls.len(),
                    self.max_tool_calls
                );
                log::warn!("⚠️ {}", warning);
                working.add_assistant(&warning, None);
                continue;
            }

            let content = reply.content.unwrap_or_default();
            working.add_assistant(&content, Some(tool_calls.clone()));

            for (tool_call_id, result) in self.agent.execute_tool_calls(&tool_calls).await {
                working.add_tool_result(&tool_call_id, &result);
            }
        }

        bail!(
            "no final answer after {} iterations; try a simpler instruction",
            params.max_iterations
        )
    }

    async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    async fn clear_history(&self) {
        self.history.lock().await.clear();
    }
}

/// Attaches `AugmentedLlm`s backed by an OpenAI-compatible API
pub struct OpenAiEngine {
    config: LlmConfig,
}

impl OpenAiEngine {
    pub fn new(config: LlmConfig) -> Self {
        OpenAiEngine { config }
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn attach(&self, agent: Arc<Agent>, credential: &Credential) -> Result<Arc<dyn Engine>> {
        reqwest::Url::parse(&self.config.base_url)
            .with_context(|| format!("invalid LLM base url: {}", self.config.base_url))?;

        log::info!(
            "attaching {} to agent '{}' ({} tools)",
            self.config.model,
            agent.name(),
            agent.tools().len()
        );

        let client = LlmClient::new(self.config.clone(), credential.clone());
        Ok(Arc::new(AugmentedLlm::new(
            agent,
            Arc::new(client),
            self.config.max_tool_calls,
        )))
    }
}
