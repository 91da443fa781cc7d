//! AI provider adapters and the cycling/fallback layer.

pub mod anthropic;
pub mod cycler;
pub mod feedback;
pub mod gemini;
pub mod mistral;
pub mod openai;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::questions::model::{Candidate, ProposedEdits, QuestionRow};
use crate::tasks::model::GenerationCriteria;

/// One generation call: how many items, for what criteria, avoiding which
/// existing texts.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub criteria: GenerationCriteria,
    pub batch_size: usize,
    /// Recent question texts the model is told not to repeat.
    pub avoid_texts: Vec<String>,
    /// Freshness guidance forwarded into the prompt.
    pub freshness_guidance: String,
}

/// What a validating provider says about one persisted question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderVerdict {
    pub is_valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_edits: Option<ProposedEdits>,
    /// Other options the validator considers equally correct. Non-empty means
    /// the question is ambiguous.
    #[serde(default)]
    pub alternative_correct_options: Vec<String>,
    #[serde(default)]
    pub time_sensitive: Option<bool>,
    #[serde(default)]
    pub best_before_date: Option<String>,
}

/// Common interface for all AI providers.
///
/// `generate` and `validate` are mandatory; correction is an optional
/// capability a provider opts into via `corrector`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Hard cap on items per generation call. Requests for more are split
    /// into rounds by the pipeline.
    fn max_items_per_request(&self) -> usize {
        10
    }

    /// Whether the adapter has credentials. Unconfigured providers are
    /// skipped by the cycler rather than erroring mid-task.
    fn is_configured(&self) -> bool;

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Candidate>, ProviderError>;

    /// Whether the adapter can serve validation calls. Generation-only
    /// adapters return false and are never placed in the validation pool.
    fn supports_validation(&self) -> bool {
        true
    }

    async fn validate(&self, question: &QuestionRow) -> Result<ProviderVerdict, ProviderError>;

    /// Correction capability, if the provider supports it.
    fn corrector(&self) -> Option<&dyn Corrector> {
        None
    }

    /// Dedicated ambiguity check, if the provider supports it.
    fn ambiguity_checker(&self) -> Option<&dyn AmbiguityChecker> {
        None
    }

    /// Cheap reachability probe, if the provider supports it.
    fn availability(&self) -> Option<&dyn AvailabilityCheck> {
        None
    }
}

/// Optional capability: rewrite an invalid question given its issues.
#[async_trait]
pub trait Corrector: Send + Sync {
    async fn correct(
        &self,
        question: &QuestionRow,
        issues: &[String],
    ) -> Result<ProposedEdits, ProviderError>;
}

/// Outcome of a dedicated ambiguity check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmbiguityResult {
    pub ambiguous: bool,
    #[serde(default)]
    pub alternative_correct_options: Vec<String>,
}

/// Optional capability: check whether more than one option could be correct.
#[async_trait]
pub trait AmbiguityChecker: Send + Sync {
    async fn check_ambiguity(
        &self,
        question: &QuestionRow,
    ) -> Result<AmbiguityResult, ProviderError>;
}

/// Optional capability: probe the provider endpoint without burning tokens.
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    async fn check_availability(&self) -> Result<bool, ProviderError>;
}

pub type SharedProvider = Arc<dyn Provider>;

/// Per-provider settings from the config file. Adapters read their API key
/// from the environment when `api_key` is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    pub max_items_per_request: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            api_key: None,
            base_url: None,
            timeout_ms: 60_000,
            max_items_per_request: 10,
        }
    }
}

/// Run a provider HTTP call under its configured deadline.
pub(crate) async fn with_deadline<T>(
    provider: &str,
    timeout_ms: u64,
    fut: impl std::future::Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_ms,
        }),
    }
}

impl ProviderSettings {
    /// Resolve the API key: explicit config wins, then the given env var.
    pub fn resolve_api_key(&self, env_var: &str) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
    }
}
