//! Daemon configuration: built-in defaults overridden by
//! `{data_dir}/config.toml`, overridden by CLI flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

use crate::providers::ProviderSettings;

const DEFAULT_PROVIDER_ORDER: [&str; 4] = ["openai", "anthropic", "gemini", "mistral"];

// ─── GenerationConfig ────────────────────────────────────────────────────────

/// Generation pipeline configuration (`[generation]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Default items requested per provider call (default: 5).
    pub default_batch_size: usize,
    /// Upper bound on `amount` per task (default: 50).
    pub max_amount: usize,
    /// Chain a validation task after each completed generation (default: true).
    pub auto_validate: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 5,
            max_amount: 50,
            auto_validate: true,
        }
    }
}

impl GenerationConfig {
    /// `max(3, ceil(amount / default_batch_size) + 2)` rounds per task.
    pub fn max_rounds(&self, amount: usize) -> usize {
        let batch = self.default_batch_size.max(1);
        3.max(amount.div_ceil(batch) + 2)
    }
}

// ─── WatchdogConfig ──────────────────────────────────────────────────────────

/// Watchdog budgets (`[watchdog]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Idle budget: no progress for this long trips the watchdog (default: 120 000).
    pub idle_ms: u64,
    /// Floor for the total budget (default: 300 000 = 5 min).
    pub min_total_ms: u64,
    /// Per-item contribution to the total budget (default: 45 000).
    pub per_item_ms: u64,
    /// Check interval (default: 5 000).
    pub check_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            idle_ms: 120_000,
            min_total_ms: 300_000,
            per_item_ms: 45_000,
            check_interval_ms: 5_000,
        }
    }
}

// ─── DedupConfig ─────────────────────────────────────────────────────────────

/// Deduplication configuration (`[dedup]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Similarity percentage at or above which a candidate is rejected (default: 90).
    pub similarity_threshold: u8,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: crate::dedup::DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

// ─── ProvidersConfig ─────────────────────────────────────────────────────────

/// Provider order and per-provider profiles (`[providers]`, `[providers.openai]`, …).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Priority order used by the cycler.
    pub order: Vec<String>,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub gemini: ProviderSettings,
    pub mistral: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_PROVIDER_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
            openai: ProviderSettings::default(),
            anthropic: ProviderSettings::default(),
            gemini: ProviderSettings::default(),
            mistral: ProviderSettings::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn settings_for(&self, name: &str) -> Option<&ProviderSettings> {
        match name {
            "openai" => Some(&self.openai),
            "anthropic" => Some(&self.anthropic),
            "gemini" => Some(&self.gemini),
            "mistral" => Some(&self.mistral),
            _ => None,
        }
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Log level filter string, e.g. "debug", "info,quizd=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    generation: Option<GenerationConfig>,
    watchdog: Option<WatchdogConfig>,
    dedup: Option<DedupConfig>,
    providers: Option<ProvidersConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

/// Fully-resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log: String,
    pub log_format: String,
    pub generation: GenerationConfig,
    pub watchdog: WatchdogConfig,
    pub dedup: DedupConfig,
    pub providers: ProvidersConfig,
}

impl Config {
    /// Resolve the effective configuration.
    ///
    /// Priority: CLI argument > TOML file at `{data_dir}/config.toml` >
    /// built-in default.
    pub fn load(data_dir: Option<PathBuf>, log: Option<String>) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        Self {
            data_dir,
            log: log
                .or(toml.log)
                .unwrap_or_else(|| "info".to_string()),
            log_format: toml.log_format.unwrap_or_else(|| "pretty".to_string()),
            generation: toml.generation.unwrap_or_default(),
            watchdog: toml.watchdog.unwrap_or_default(),
            dedup: toml.dedup.unwrap_or_default(),
            providers: toml.providers.unwrap_or_default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("quizd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("quizd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("quizd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("quizd");
        }
    }
    PathBuf::from(".quizd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_rounds_formula() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_rounds(1), 3);
        assert_eq!(config.max_rounds(5), 3);
        assert_eq!(config.max_rounds(10), 4);
        assert_eq!(config.max_rounds(25), 7);
    }

    #[test]
    fn toml_overrides_apply_per_section() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "log = \"debug\"\n\n[watchdog]\nidle_ms = 60000\n\n[providers.mistral]\nenabled = false\n",
        )
        .unwrap();

        let config = Config::load(Some(dir.path().to_path_buf()), None);
        assert_eq!(config.log, "debug");
        assert_eq!(config.watchdog.idle_ms, 60_000);
        // Untouched sections keep defaults.
        assert_eq!(config.watchdog.per_item_ms, 45_000);
        assert_eq!(config.generation.default_batch_size, 5);
        assert!(!config.providers.mistral.enabled);
        assert!(config.providers.openai.enabled);
    }

    #[test]
    fn cli_log_level_beats_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "log = \"warn\"\n").unwrap();
        let config = Config::load(Some(dir.path().to_path_buf()), Some("trace".into()));
        assert_eq!(config.log, "trace");
    }
}
