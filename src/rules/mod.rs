//! Rule configuration: two-level (global + per-target-audience) rule sets.
//!
//! Stored as JSON blobs in `ai_rule_sets(scope_type, scope_id, config)` and
//! loaded once per task invocation — read-only while a task runs. When no
//! global row exists, the built-in child-protection defaults apply.

pub mod evaluator;

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::freshness::FreshnessConfig;

/// Answer-leak check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerInQuestionConfig {
    pub enabled: bool,
    /// Correct options shorter than this never count as a leak.
    pub min_answer_length: usize,
}

impl Default for AnswerInQuestionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_answer_length: 4,
        }
    }
}

/// Auto-correction settings for the validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCorrectionConfig {
    pub enabled: bool,
}

/// One blocklist entry: a regex pattern scoped to zero or more age groups.
///
/// An empty `age_groups` list means the rule applies to every age group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistRule {
    pub pattern: String,
    pub issue: String,
    #[serde(default)]
    pub age_groups: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// One scope (global or a single target audience) of rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub enabled: bool,
    pub answer_in_question: AnswerInQuestionConfig,
    pub auto_correction: AutoCorrectionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness: Option<FreshnessConfig>,
    pub max_question_length_by_age_group: HashMap<String, usize>,
    pub blocklist: Vec<BlocklistRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            enabled: true,
            answer_in_question: AnswerInQuestionConfig::default(),
            auto_correction: AutoCorrectionConfig::default(),
            freshness: None,
            max_question_length_by_age_group: HashMap::new(),
            blocklist: Vec::new(),
        }
    }
}

impl RuleSet {
    fn normalize(&mut self) {
        for rule in &mut self.blocklist {
            rule.age_groups = rule
                .age_groups
                .iter()
                .map(|g| g.trim().to_lowercase())
                .filter(|g| !g.is_empty())
                .collect();
        }
        self.max_question_length_by_age_group = self
            .max_question_length_by_age_group
            .drain()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
    }
}

/// The full two-level rule configuration for one task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub global: RuleSet,
    pub target_audiences: HashMap<String, RuleSet>,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            global: default_global_rule_set(),
            target_audiences: HashMap::new(),
        }
    }
}

impl RuleConfig {
    /// Rule set for a target audience, if one is configured and enabled.
    pub fn target_rules(&self, target_audience: &str) -> Option<&RuleSet> {
        self.target_audiences
            .get(&target_audience.to_lowercase())
            .filter(|set| set.enabled)
    }

    /// Effective freshness config: target-audience override, else global,
    /// else the built-in defaults.
    pub fn freshness_for(&self, target_audience: &str) -> FreshnessConfig {
        if let Some(set) = self.target_rules(target_audience) {
            if let Some(freshness) = &set.freshness {
                return freshness.clone();
            }
        }
        self.global
            .freshness
            .clone()
            .unwrap_or_default()
    }

    /// Whether auto-correction is enabled for this target audience.
    pub fn auto_correction_enabled(&self, target_audience: &str) -> bool {
        if let Some(set) = self.target_rules(target_audience) {
            if set.auto_correction.enabled {
                return true;
            }
        }
        self.global.auto_correction.enabled
    }
}

/// Built-in global defaults: answer-leak on, freshness on, and a Swedish
/// child-protection blocklist scoped to the `children` age group.
pub fn default_global_rule_set() -> RuleSet {
    // No trailing \b: Swedish definite and genitive forms carry suffixes
    // ("världskriget", "inflationen", "skatten") that must still match.
    let child_rules: [(&str, &str); 6] = [
        (
            r"\b(politik|riksdag|statsminister|regering|parlament|valsystem)",
            "Politik är för avancerat för barn.",
        ),
        (
            r"\b(världskrig|kalla kriget|krig)",
            "Frågor om krig är för avancerat för barn.",
        ),
        (
            r"\b(inflation|ränta|budget|skatt|ekonomi)",
            "Ekonomi är för avancerat för barn.",
        ),
        (
            r"\b(molekyl|genetik|dna|kvant|relativitet|atom)",
            "Avancerad naturvetenskap är för avancerat för barn.",
        ),
        (
            r"\b(impressionism|renässans|barock|expressionism|surrealism|kubism|realism|modernism)",
            "Konsthistoria är för avancerat för barn.",
        ),
        (
            r"\b(opera|symfoni|kompositör|dirigent)",
            "Avancerad musikhistoria är för avancerat för barn.",
        ),
    ];

    RuleSet {
        enabled: true,
        answer_in_question: AnswerInQuestionConfig::default(),
        auto_correction: AutoCorrectionConfig { enabled: false },
        freshness: Some(FreshnessConfig::default()),
        max_question_length_by_age_group: HashMap::from([("children".to_string(), 180)]),
        blocklist: child_rules
            .into_iter()
            .map(|(pattern, issue)| BlocklistRule {
                pattern: pattern.to_string(),
                issue: issue.to_string(),
                age_groups: vec!["children".to_string()],
                enabled: true,
            })
            .collect(),
    }
}

/// Read-only access to the persisted rule configuration.
#[derive(Clone)]
pub struct RuleStore {
    pool: SqlitePool,
}

impl RuleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the full rule config snapshot.
    ///
    /// Missing or unparsable scope rows fall back to defaults (global) or are
    /// skipped (target audiences) — a broken admin edit must not take the
    /// pipeline down.
    pub async fn load(&self) -> Result<RuleConfig> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT scope_type, scope_id, config FROM ai_rule_sets")
                .fetch_all(&self.pool)
                .await?;

        let mut config = RuleConfig::default();
        for (scope_type, scope_id, raw) in rows {
            match scope_type.as_str() {
                "global" => match serde_json::from_str::<RuleSet>(&raw) {
                    Ok(mut set) => {
                        set.normalize();
                        config.global = set;
                    }
                    Err(e) => {
                        tracing::warn!(err = %e, "unparsable global rule set — using defaults")
                    }
                },
                "target_audience" => match serde_json::from_str::<RuleSet>(&raw) {
                    Ok(mut set) => {
                        set.normalize();
                        config.target_audiences.insert(scope_id.to_lowercase(), set);
                    }
                    Err(e) => {
                        tracing::warn!(scope = %scope_id, err = %e, "skipping unparsable target-audience rule set")
                    }
                },
                other => {
                    tracing::warn!(scope_type = %other, "unknown rule scope type — skipping")
                }
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_child_blocklist() {
        let config = RuleConfig::default();
        assert!(config.global.enabled);
        assert!(!config.global.blocklist.is_empty());
        assert!(config
            .global
            .blocklist
            .iter()
            .all(|r| r.age_groups == vec!["children".to_string()]));
        assert_eq!(
            config.global.max_question_length_by_age_group.get("children"),
            Some(&180)
        );
    }

    #[test]
    fn freshness_prefers_target_audience_override() {
        let mut config = RuleConfig::default();
        let mut set = RuleSet::default();
        set.freshness = Some(FreshnessConfig {
            default_shelf_life_days: 30,
            ..FreshnessConfig::default()
        });
        config.target_audiences.insert("swedish".into(), set);

        assert_eq!(config.freshness_for("Swedish").default_shelf_life_days, 30);
        assert_eq!(config.freshness_for("global").default_shelf_life_days, 365);
    }

    #[tokio::test]
    async fn load_falls_back_to_defaults_without_rows() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE ai_rule_sets (scope_type TEXT NOT NULL, scope_id TEXT NOT NULL, \
             config TEXT NOT NULL, updated_at INTEGER, PRIMARY KEY (scope_type, scope_id))",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = RuleStore::new(pool);
        let config = store.load().await.unwrap();
        assert!(!config.global.blocklist.is_empty(), "defaults expected");
        assert!(config.target_audiences.is_empty());
    }

    #[tokio::test]
    async fn load_reads_scoped_rows() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE ai_rule_sets (scope_type TEXT NOT NULL, scope_id TEXT NOT NULL, \
             config TEXT NOT NULL, updated_at INTEGER, PRIMARY KEY (scope_type, scope_id))",
        )
        .execute(&pool)
        .await
        .unwrap();

        let set = serde_json::json!({
            "enabled": true,
            "blocklist": [
                {"pattern": "krig", "issue": "Olämpligt innehåll.", "age_groups": ["Children"]}
            ]
        });
        sqlx::query("INSERT INTO ai_rule_sets (scope_type, scope_id, config) VALUES (?, ?, ?)")
            .bind("target_audience")
            .bind("Swedish")
            .bind(set.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let config = RuleStore::new(pool).load().await.unwrap();
        let target = config.target_rules("swedish").expect("scope loaded");
        assert_eq!(target.blocklist.len(), 1);
        // Age groups are lowercased on load.
        assert_eq!(target.blocklist[0].age_groups, vec!["children".to_string()]);
    }
}
