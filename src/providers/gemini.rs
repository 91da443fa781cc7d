//! Google Gemini adapter — generateContent with JSON response MIME type.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{prompts, with_deadline, GenerationRequest, Provider, ProviderSettings, ProviderVerdict};
use crate::error::ProviderError;
use crate::questions::model::{Candidate, QuestionRow};

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout_ms: u64,
    max_items: usize,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            api_key: settings.resolve_api_key("GEMINI_API_KEY"),
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

    async fn generate_content(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
    ) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured {
                provider: "gemini".to_string(),
            })?;

        let body = json!({
            "system_instruction": {"parts": [{"text": system}]},
            "contents": [{"role": "user", "parts": [{"text": user}]}],
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json",
            },
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, key
        );

        let call = async {
            let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
                ProviderError::Transport {
                    provider: "gemini".to_string(),
                    message: e.to_string(),
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(ProviderError::Transport {
                    provider: "gemini".to_string(),
                    message: format!("HTTP {status}: {detail}"),
                });
            }

            let parsed: GenerateContentResponse =
                response
                    .json()
                    .await
                    .map_err(|e| ProviderError::BadResponse {
                        provider: "gemini".to_string(),
                        message: e.to_string(),
                    })?;
            parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content.parts.into_iter().next())
                .map(|p| p.text)
                .ok_or_else(|| ProviderError::BadResponse {
                    provider: "gemini".to_string(),
                    message: "no candidates in response".to_string(),
                })
        };
        with_deadline("gemini", self.timeout_ms, call).await
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
            .generate_content(
                &prompts::generation_system_prompt(request),
                &prompts::generation_user_prompt(request),
                0.8,
            )
            .await?;
        prompts::parse_candidates("gemini", &self.model, &content)
    }

    async fn validate(&self, question: &QuestionRow) -> Result<ProviderVerdict, ProviderError> {
        let content = self
            .generate_content(
                &prompts::validation_system_prompt(question),
                &prompts::validation_user_prompt(question),
                0.0,
            )
            .await?;
        prompts::parse_verdict("gemini", &content)
    }
}
