pub mod config;
pub mod dedup;
pub mod error;
pub mod freshness;
pub mod pipeline;
pub mod providers;
pub mod questions;
pub mod retry;
pub mod rules;
pub mod storage;
pub mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;

use config::Config;
use pipeline::TaskContext;
use providers::anthropic::AnthropicProvider;
use providers::cycler::ProviderCycler;
use providers::feedback::FeedbackStore;
use providers::gemini::GeminiProvider;
use providers::mistral::MistralProvider;
use providers::openai::OpenAiProvider;
use providers::SharedProvider;
use questions::QuestionStore;
use rules::RuleStore;
use tasks::TaskStore;

/// Build every provider adapter named in `[providers].order`, skipping
/// profiles with `enabled = false`. Unknown names are logged and dropped so a
/// stale config entry cannot take the daemon down.
pub fn build_providers(config: &Config, client: &reqwest::Client) -> Vec<SharedProvider> {
    let mut providers: Vec<SharedProvider> = Vec::new();
    for name in &config.providers.order {
        let Some(settings) = config.providers.settings_for(name) else {
            tracing::warn!(provider = %name, "unknown provider in order — skipping");
            continue;
        };
        if !settings.enabled {
            tracing::debug!(provider = %name, "provider disabled in config");
            continue;
        }
        let provider: SharedProvider = match name.as_str() {
            "openai" => Arc::new(OpenAiProvider::new(client.clone(), settings)),
            "anthropic" => Arc::new(AnthropicProvider::new(client.clone(), settings)),
            "gemini" => Arc::new(GeminiProvider::new(client.clone(), settings)),
            "mistral" => Arc::new(MistralProvider::new(client.clone(), settings)),
            _ => unreachable!("settings_for only resolves known names"),
        };
        providers.push(provider);
    }
    providers
}

/// Wire the shared task context from an open pool: stores, provider cycler
/// and the live-handle registry.
pub fn build_context(config: Arc<Config>, pool: SqlitePool) -> Arc<TaskContext> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_default();
    let cycler = Arc::new(ProviderCycler::new(build_providers(&config, &client)));

    Arc::new(TaskContext::new(
        config,
        TaskStore::new(pool.clone()),
        QuestionStore::new(pool.clone()),
        RuleStore::new(pool.clone()),
        FeedbackStore::new(pool),
        cycler,
    ))
}

/// Open the database under `config.data_dir` and build the task context.
pub async fn bootstrap(config: Arc<Config>) -> Result<Arc<TaskContext>> {
    let pool = storage::open(&config.data_dir).await?;
    Ok(build_context(config, pool))
}
