//! Anthropic adapter — messages API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    prompts, with_deadline, AmbiguityChecker, AmbiguityResult, Corrector, GenerationRequest,
    Provider, ProviderSettings, ProviderVerdict,
};
use crate::error::ProviderError;
use crate::questions::model::{Candidate, ProposedEdits, QuestionRow};

const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout_ms: u64,
    max_items: usize,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            api_key: settings.resolve_api_key("ANTHROPIC_API_KEY"),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_ms: settings.timeout_ms,
            max_items: settings.max_items_per_request,
        }
    }

    async fn message(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: "anthropic".to_string(),
            })?;

        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let call = async {
            let response = self
                .client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", key)
                .header("anthropic-version", API_VERSION)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    provider: "anthropic".to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(ProviderError::Transport {
                    provider: "anthropic".to_string(),
                    message: format!("HTTP {status}: {detail}"),
                });
            }

            let parsed: MessagesResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ProviderError::BadResponse {
                        provider: "anthropic".to_string(),
                        message: e.to_string(),
                    })?;
            parsed
                .content
                .into_iter()
                .find_map(|block| block.text)
                .ok_or_else(|| ProviderError::BadResponse {
                    provider: "anthropic".to_string(),
                    message: "no text block in response".to_string(),
                })
        };
        with_deadline("anthropic", self.timeout_ms, call).await
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn max_items_per_request(&self) -> usize {
        self.max_items
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Candidate>, ProviderError> {
        let content = self
            .message(
                &prompts::generation_system_prompt(request),
                &prompts::generation_user_prompt(request),
                4096,
            )
            .await?;
        prompts::parse_candidates("anthropic", &self.model, &content)
    }

    async fn validate(&self, question: &QuestionRow) -> Result<ProviderVerdict, ProviderError> {
        let content = self
            .message(
                &prompts::validation_system_prompt(question),
                &prompts::validation_user_prompt(question),
                1024,
            )
            .await?;
        prompts::parse_verdict("anthropic", &content)
    }

    fn corrector(&self) -> Option<&dyn Corrector> {
        Some(self)
    }

    fn ambiguity_checker(&self) -> Option<&dyn AmbiguityChecker> {
        Some(self)
    }
}

#[async_trait]
impl AmbiguityChecker for AnthropicProvider {
    async fn check_ambiguity(
        &self,
        question: &QuestionRow,
    ) -> Result<AmbiguityResult, ProviderError> {
        let content = self
            .message(
                &prompts::ambiguity_system_prompt(),
                &prompts::ambiguity_user_prompt(question),
                512,
            )
            .await?;
        prompts::parse_ambiguity("anthropic", &content)
    }
}

#[async_trait]
impl Corrector for AnthropicProvider {
    async fn correct(
        &self,
        question: &QuestionRow,
        issues: &[String],
    ) -> Result<ProposedEdits, ProviderError> {
        let content = self
            .message(
                &prompts::correction_system_prompt(),
                &prompts::correction_user_prompt(question, issues),
                2048,
            )
            .await?;
        prompts::parse_edits("anthropic", &content)
    }
}
