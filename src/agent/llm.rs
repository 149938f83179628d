use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::LlmConfig;
use crate::credentials::Credential;
use crate::types::{ChatRequest, ChatResponse, Message, Tool};

use super::engine::RequestParams;

/// One model round-trip: transcript and tools in, assistant message out
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        params: &RequestParams,
    ) -> Result<Message>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    api_key: Credential,
}

impl LlmClient {
    pub fn new(config: LlmConfig, api_key: Credential) -> Self {
        LlmClient {
            client: Client::new(),
            config,
            api_key,
        }
    }

    pub async fn chat_with_retry(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        params: &RequestParams,
    ) -> Result<Message> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.chat(messages, tools, params).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt < attempts {
                        log::warn!(
                            "⚠️ LLM request failed (attempt {}/{}), retrying: {:#}",
                            attempt,
                            attempts,
                            e
                        );
                        tokio::time::sleep(tokio::time::Duration::from_millis(100 * (1 << attempt)))
                            .await;
                    }
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e.context(format!("LLM request failed after {} attempts", attempts))),
            None => Err(anyhow::anyhow!("LLM request was never attempted")),
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        params: &RequestParams,
    ) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            tools: tools.filter(|t| !t.is_empty()).map(|t| t.to_vec()),
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        params: &RequestParams,
    ) -> Result<Message> {
        let request = self.build_request(messages, tools, params);

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .context("failed to reach the chat completions API")?;

        let status = response.status();
        let text = response.text().await.context("failed to read response body")?;

        let parsed: Option<ChatResponse> = serde_json::from_str(&text).ok();
        if let Some(err) = parsed.as_ref().and_then(|r| r.error.as_ref()) {
            return Err(anyhow::anyhow!("LLM API error ({}): {}", status, err.message));
        }
        if !status.is_success() {
            return Err(anyhow::anyhow!("LLM API error: {} - {}", status, text));
        }

        let response = parsed.with_context(|| format!("unexpected LLM response: {}", text))?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .context("LLM response contained no choices")
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[Tool]>,
        params: &RequestParams,
    ) -> Result<Message> {
        self.chat_with_retry(messages, tools, params).await
    }
}
