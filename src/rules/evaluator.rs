//! Pure rule evaluation over one question.
//!
//! `evaluate` is deterministic and does no I/O. It collects every issue
//! rather than stopping at the first: a question that both leaks its answer
//! and trips a blocklist rule reports both problems.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{BlocklistRule, RuleConfig, RuleSet};
use crate::questions::model::{Candidate, QuestionRow};
use crate::tasks::model::GenerationCriteria;

/// Phrases that define the answer inside the question text.
static SV_DEFINITION_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(d\.?\s*v\.?\s*s\.?|dvs|det vill säga|vilket betyder|som betyder|det betyder)\b")
        .expect("static regex")
});
static EN_DEFINITION_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(i\.?\s*e\.?|that is|which means|meaning)\b").expect("static regex")
});

/// Everything the evaluator needs to know about one question.
#[derive(Debug, Clone, Default)]
pub struct RuleSubject {
    pub question_sv: String,
    pub question_en: String,
    pub options_sv: Vec<String>,
    pub options_en: Vec<String>,
    pub correct_option: i64,
    pub explanation_sv: String,
    pub explanation_en: String,
    pub background_sv: String,
    pub background_en: String,
    /// Lowercased age groups; the first entry is the primary group used for
    /// length limits.
    pub age_groups: Vec<String>,
    pub target_audience: String,
}

impl RuleSubject {
    pub fn from_candidate(candidate: &Candidate, criteria: &GenerationCriteria) -> Self {
        Self {
            question_sv: candidate.question_sv.clone(),
            question_en: candidate.question_en.clone(),
            options_sv: candidate.options_sv.clone(),
            options_en: candidate.options_en.clone(),
            correct_option: candidate.correct_option,
            explanation_sv: candidate.explanation_sv.clone(),
            explanation_en: candidate.explanation_en.clone(),
            background_sv: candidate.background_sv.clone(),
            background_en: candidate.background_en.clone(),
            age_groups: vec![criteria.age_group.to_lowercase()],
            target_audience: criteria.target_audience.to_lowercase(),
        }
    }

    pub fn from_row(row: &QuestionRow) -> Self {
        Self {
            question_sv: row.question_sv.clone(),
            question_en: row.question_en.clone(),
            options_sv: row.options_sv_vec(),
            options_en: row.options_en_vec(),
            correct_option: row.correct_option,
            explanation_sv: row.explanation_sv.clone(),
            explanation_en: row.explanation_en.clone(),
            background_sv: row.background_sv.clone(),
            background_en: row.background_en.clone(),
            age_groups: row
                .age_groups_vec()
                .iter()
                .map(|g| g.to_lowercase())
                .collect(),
            target_audience: row.target_audience.to_lowercase(),
        }
    }

    fn primary_age_group(&self) -> Option<&str> {
        self.age_groups.first().map(String::as_str)
    }

    /// All text fields in both languages, lowercased and joined — the blob
    /// blocklist patterns are matched against.
    fn text_blob(&self) -> String {
        let mut parts: Vec<&str> = vec![
            &self.question_sv,
            &self.question_en,
            &self.explanation_sv,
            &self.explanation_en,
            &self.background_sv,
            &self.background_en,
        ];
        parts.extend(self.options_sv.iter().map(String::as_str));
        parts.extend(self.options_en.iter().map(String::as_str));
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// Outcome of rule evaluation. Valid iff no issue was collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

/// Evaluate the global rule set and the matching target-audience rule set,
/// merging their issues.
pub fn evaluate(subject: &RuleSubject, config: &RuleConfig) -> RuleVerdict {
    let mut issues = Vec::new();
    let blob = subject.text_blob();

    if config.global.enabled {
        evaluate_answer_leak(subject, &config.global, &mut issues);
        evaluate_length(subject, &config.global, &mut issues);
        evaluate_blocklist(subject, &blob, &config.global.blocklist, &mut issues);
    }

    if let Some(target) = config.target_rules(&subject.target_audience) {
        evaluate_length(subject, target, &mut issues);
        evaluate_blocklist(subject, &blob, &target.blocklist, &mut issues);
    }

    RuleVerdict {
        is_valid: issues.is_empty(),
        issues,
    }
}

fn evaluate_answer_leak(subject: &RuleSubject, set: &RuleSet, issues: &mut Vec<String>) {
    if !set.answer_in_question.enabled {
        return;
    }
    let min_len = set.answer_in_question.min_answer_length;

    let leaks = answer_in_text(
        &subject.question_sv,
        &subject.options_sv,
        subject.correct_option,
        min_len,
    ) || answer_in_text(
        &subject.question_en,
        &subject.options_en,
        subject.correct_option,
        min_len,
    );

    if leaks {
        issues.push("Frågan avslöjar svaret i frågetexten.".to_string());
    } else if SV_DEFINITION_HINT.is_match(&subject.question_sv)
        || EN_DEFINITION_HINT.is_match(&subject.question_en)
    {
        issues.push("Frågan innehåller en förklaring i frågetexten.".to_string());
    }
}

fn answer_in_text(text: &str, options: &[String], correct: i64, min_len: usize) -> bool {
    if text.is_empty() || correct < 0 {
        return false;
    }
    let Some(answer) = options.get(correct as usize) else {
        return false;
    };
    let answer = answer.trim();
    if answer.chars().count() < min_len {
        return false;
    }
    text.to_lowercase().contains(&answer.to_lowercase())
}

fn evaluate_length(subject: &RuleSubject, set: &RuleSet, issues: &mut Vec<String>) {
    let Some(age_group) = subject.primary_age_group() else {
        return;
    };
    if let Some(max_len) = set.max_question_length_by_age_group.get(age_group) {
        if subject.question_sv.chars().count() > *max_len {
            issues.push("Frågetexten är för lång för angiven åldersgrupp.".to_string());
        }
    }
}

fn evaluate_blocklist(
    subject: &RuleSubject,
    blob: &str,
    rules: &[BlocklistRule],
    issues: &mut Vec<String>,
) {
    for rule in rules {
        if !rule.enabled {
            continue;
        }
        if !rule.age_groups.is_empty()
            && !rule
                .age_groups
                .iter()
                .any(|g| subject.age_groups.contains(g))
        {
            continue;
        }
        if matches_pattern(&rule.pattern, blob) {
            issues.push(rule.issue.clone());
        }
    }
}

/// Match a blocklist pattern against the blob. A pattern that fails to
/// compile degrades to a case-insensitive literal substring match instead of
/// failing the evaluation.
fn matches_pattern(pattern: &str, blob: &str) -> bool {
    match Regex::new(&format!("(?i){pattern}")) {
        Ok(re) => re.is_match(blob),
        Err(_) => blob.contains(&pattern.to_lowercase()),
    }
}
