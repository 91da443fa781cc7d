//! Question data model: ephemeral candidates and persisted rows.

use serde::{Deserialize, Serialize};

use crate::freshness::FreshnessFields;

/// Which provider/model produced a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub provider: String,
    pub model: String,
}

/// A generated question that has not been persisted yet.
///
/// Lifecycle: created by a provider call, consumed by deduplication → rule
/// evaluation → persistence; discarded if rejected at any stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub question_sv: String,
    #[serde(default)]
    pub question_en: String,
    pub options_sv: Vec<String>,
    #[serde(default)]
    pub options_en: Vec<String>,
    pub correct_option: i64,
    #[serde(default)]
    pub explanation_sv: String,
    #[serde(default)]
    pub explanation_en: String,
    #[serde(default)]
    pub background_sv: String,
    #[serde(default)]
    pub background_en: String,
    #[serde(default)]
    pub emoji: Option<String>,
    /// Provider-declared time sensitivity, if any.
    #[serde(default)]
    pub time_sensitive: Option<bool>,
    /// Provider-declared best-before date (`YYYY-MM-DD`), if any.
    #[serde(default)]
    pub best_before_date: Option<String>,
    pub provenance: Provenance,
}

impl Candidate {
    /// Structural checks run before a candidate enters deduplication.
    ///
    /// Mirrors the import-path validation: text length, exactly four
    /// non-empty unique options per language, correct index in range,
    /// explanation present. Returns all problems found, not just the first.
    pub fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.question_sv.trim().len() < 10 {
            issues.push("question text must be at least 10 characters".to_string());
        }
        for (label, options) in [("sv", &self.options_sv), ("en", &self.options_en)] {
            // English options may be absent entirely; if present they must be complete.
            if label == "en" && options.is_empty() {
                continue;
            }
            if options.len() != 4 {
                issues.push(format!(
                    "question must have exactly 4 {label} options (has {})",
                    options.len()
                ));
                continue;
            }
            if options.iter().any(|o| o.trim().is_empty()) {
                issues.push(format!("empty {label} option"));
            }
            let unique: std::collections::HashSet<String> = options
                .iter()
                .map(|o| o.trim().to_lowercase())
                .collect();
            if unique.len() != options.len() {
                issues.push(format!("duplicate {label} options"));
            }
        }
        if self.correct_option < 0 || self.correct_option >= self.options_sv.len() as i64 {
            issues.push(format!(
                "correct option index {} out of range",
                self.correct_option
            ));
        }
        if self.explanation_sv.trim().len() < 10 {
            issues.push("explanation must be at least 10 characters".to_string());
        }

        issues
    }
}

/// A persisted question row (`questions` table).
///
/// Options and age groups are stored as JSON arrays in TEXT columns.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuestionRow {
    pub id: String,
    pub question_sv: String,
    pub question_en: String,
    pub options_sv: String, // JSON array
    pub options_en: String, // JSON array
    pub correct_option: i64,
    pub explanation_sv: String,
    pub explanation_en: String,
    pub background_sv: String,
    pub background_en: String,
    pub emoji: Option<String>,
    pub category: String,
    pub difficulty: String,
    pub age_groups: String, // JSON array
    pub target_audience: String,
    pub validated: bool,
    pub quarantined: bool,
    pub time_sensitive: bool,
    pub best_before_at: Option<i64>,
    pub validation_result: Option<String>, // JSON ValidationResult
    pub provider: String,
    pub model: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl QuestionRow {
    pub fn options_sv_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.options_sv).unwrap_or_default()
    }

    pub fn options_en_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.options_en).unwrap_or_default()
    }

    pub fn age_groups_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.age_groups).unwrap_or_default()
    }

    /// Parsed validation result, if a validation pass has run.
    pub fn parsed_validation(&self) -> Option<ValidationResult> {
        self.validation_result
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// Outcome of one validation pass over one persisted question.
///
/// Superseded (not appended) on re-validation after auto-correction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_edits: Option<ProposedEdits>,
    #[serde(default)]
    pub alternative_correct_options: Vec<String>,
    #[serde(default)]
    pub freshness: FreshnessFields,
    pub validation_context: ValidationContext,
}

/// Who validated, with what, and whether a correction was applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationContext {
    pub provider: String,
    pub model: String,
    /// True when the item was auto-corrected during this pass.
    pub corrected: bool,
    pub validated_at: i64,
}

/// Provider-proposed edits to an invalid question.
///
/// Every field is optional; absent fields leave the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProposedEdits {
    #[serde(default)]
    pub question_sv: Option<String>,
    #[serde(default)]
    pub question_en: Option<String>,
    #[serde(default)]
    pub options_sv: Option<Vec<String>>,
    #[serde(default)]
    pub options_en: Option<Vec<String>>,
    #[serde(default)]
    pub correct_option: Option<i64>,
    #[serde(default)]
    pub explanation_sv: Option<String>,
    #[serde(default)]
    pub explanation_en: Option<String>,
}

impl ProposedEdits {
    pub fn is_empty(&self) -> bool {
        self.question_sv.is_none()
            && self.question_en.is_none()
            && self.options_sv.is_none()
            && self.options_en.is_none()
            && self.correct_option.is_none()
            && self.explanation_sv.is_none()
            && self.explanation_en.is_none()
    }
}
