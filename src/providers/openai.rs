//! OpenAI adapter — chat completions with JSON-mode responses.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{
    prompts, with_deadline, AmbiguityChecker, AmbiguityResult, AvailabilityCheck, Corrector,
    GenerationRequest, Provider, ProviderSettings, ProviderVerdict,
};
use crate::error::ProviderError;
use crate::questions::model::{Candidate, ProposedEdits, QuestionRow};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout_ms: u64,
    max_items: usize,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            api_key: settings.resolve_api_key("OPENAI_API_KEY"),
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

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: "openai".to_string(),
            })
    }

    /// One chat-completions round trip; returns the assistant message text.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        let key = self.api_key()?;
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": {"type": "json_object"},
        });

        let call = async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    provider: "openai".to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(ProviderError::Transport {
                    provider: "openai".to_string(),
                    message: format!("HTTP {status}: {detail}"),
                });
            }

            let parsed: ChatResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ProviderError::BadResponse {
                        provider: "openai".to_string(),
                        message: e.to_string(),
                    })?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| ProviderError::BadResponse {
                    provider: "openai".to_string(),
                    message: "empty choices".to_string(),
                })
        };
        with_deadline("openai", self.timeout_ms, call).await
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
            .chat(
                &prompts::generation_system_prompt(request),
                &prompts::generation_user_prompt(request),
                0.8,
                4096,
            )
            .await?;
        prompts::parse_candidates("openai", &self.model, &content)
    }

    async fn validate(&self, question: &QuestionRow) -> Result<ProviderVerdict, ProviderError> {
        let content = self
            .chat(
                &prompts::validation_system_prompt(question),
                &prompts::validation_user_prompt(question),
                0.0,
                1024,
            )
            .await?;
        prompts::parse_verdict("openai", &content)
    }

    fn corrector(&self) -> Option<&dyn Corrector> {
        Some(self)
    }

    fn ambiguity_checker(&self) -> Option<&dyn AmbiguityChecker> {
        Some(self)
    }

    fn availability(&self) -> Option<&dyn AvailabilityCheck> {
        Some(self)
    }
}

#[async_trait]
impl AmbiguityChecker for OpenAiProvider {
    async fn check_ambiguity(
        &self,
        question: &QuestionRow,
    ) -> Result<AmbiguityResult, ProviderError> {
        let content = self
            .chat(
                &prompts::ambiguity_system_prompt(),
                &prompts::ambiguity_user_prompt(question),
                0.0,
                512,
            )
            .await?;
        prompts::parse_ambiguity("openai", &content)
    }
}

#[async_trait]
impl AvailabilityCheck for OpenAiProvider {
    async fn check_availability(&self) -> Result<bool, ProviderError> {
        let key = self.api_key()?;
        let call = async {
            let response = self
                .client
                .get(format!("{}/models", self.base_url))
                .bearer_auth(key)
                .send()
                .await
                .map_err(|e| ProviderError::Transport {
                    provider: "openai".to_string(),
                    message: e.to_string(),
                })?;
            Ok(response.status().is_success())
        };
        with_deadline("openai", self.timeout_ms.min(10_000), call).await
    }
}

#[async_trait]
impl Corrector for OpenAiProvider {
    async fn correct(
        &self,
        question: &QuestionRow,
        issues: &[String],
    ) -> Result<ProposedEdits, ProviderError> {
        let content = self
            .chat(
                &prompts::correction_system_prompt(),
                &prompts::correction_user_prompt(question, issues),
                0.2,
                2048,
            )
            .await?;
        prompts::parse_edits("openai", &content)
    }
}
