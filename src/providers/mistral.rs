//! Mistral adapter — OpenAI-compatible chat completions, generation only.
//!
//! Mistral is kept out of the validation pool: in practice it was the
//! weakest fact-checker of the four, so it only contributes candidates.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{prompts, with_deadline, GenerationRequest, Provider, ProviderSettings, ProviderVerdict};
use crate::error::ProviderError;
use crate::questions::model::{Candidate, QuestionRow};

const DEFAULT_MODEL: &str = "mistral-small-latest";
const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

pub struct MistralProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout_ms: u64,
    max_items: usize,
}

impl MistralProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            api_key: settings.resolve_api_key("MISTRAL_API_KEY"),
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
impl Provider for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
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
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: "mistral".to_string(),
            })?;

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompts::generation_system_prompt(request)},
                {"role": "user", "content": prompts::generation_user_prompt(request)},
            ],
            "temperature": 0.8,
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
                    provider: "mistral".to_string(),
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(ProviderError::Transport {
                    provider: "mistral".to_string(),
                    message: format!("HTTP {status}: {detail}"),
                });
            }

            let parsed: ChatResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ProviderError::BadResponse {
                        provider: "mistral".to_string(),
                        message: e.to_string(),
                    })?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| ProviderError::BadResponse {
                    provider: "mistral".to_string(),
                    message: "empty choices".to_string(),
                })
        };
        let content = with_deadline("mistral", self.timeout_ms, call).await?;
        prompts::parse_candidates("mistral", &self.model, &content)
    }

    fn supports_validation(&self) -> bool {
        false
    }

    async fn validate(&self, _question: &QuestionRow) -> Result<ProviderVerdict, ProviderError> {
        Err(ProviderError::BadResponse {
            provider: "mistral".to_string(),
            message: "validation is not supported by this adapter".to_string(),
        })
    }
}
