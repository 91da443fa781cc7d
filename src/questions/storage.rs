//! Persistence for question rows.

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;

use super::model::{Candidate, ProposedEdits, QuestionRow, ValidationResult};
use crate::freshness::FreshnessFields;
use crate::tasks::model::{epoch_ms, GenerationCriteria};

#[derive(Clone)]
pub struct QuestionStore {
    pool: SqlitePool,
}

impl QuestionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an accepted candidate. Pre-expired items arrive quarantined
    /// rather than being dropped, so operators can inspect them.
    pub async fn insert(
        &self,
        candidate: &Candidate,
        criteria: &GenerationCriteria,
        freshness: &FreshnessFields,
        task_id: &str,
        quarantined: bool,
    ) -> Result<QuestionRow> {
        let id = ulid::Ulid::new().to_string();
        let now = epoch_ms();
        let age_groups = serde_json::to_string(&[criteria.age_group.to_lowercase()])?;

        sqlx::query(
            "INSERT INTO questions (id, question_sv, question_en, options_sv, options_en, \
             correct_option, explanation_sv, explanation_en, background_sv, background_en, \
             emoji, category, age_groups, difficulty, target_audience, provider, model, \
             task_id, validated, quarantined, time_sensitive, best_before_at, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&candidate.question_sv)
        .bind(&candidate.question_en)
        .bind(serde_json::to_string(&candidate.options_sv)?)
        .bind(serde_json::to_string(&candidate.options_en)?)
        .bind(candidate.correct_option)
        .bind(&candidate.explanation_sv)
        .bind(&candidate.explanation_en)
        .bind(&candidate.background_sv)
        .bind(&candidate.background_en)
        .bind(&candidate.emoji)
        .bind(&criteria.category)
        .bind(age_groups)
        .bind(&criteria.difficulty)
        .bind(criteria.target_audience.to_lowercase())
        .bind(&candidate.provenance.provider)
        .bind(&candidate.provenance.model)
        .bind(task_id)
        .bind(quarantined)
        .bind(freshness.time_sensitive)
        .bind(freshness.best_before_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow!("question {id} vanished after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<QuestionRow>> {
        let row = sqlx::query_as::<_, QuestionRow>("SELECT * FROM questions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<QuestionRow>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.get(id).await? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Question texts used to seed the dedup corpus for one task run.
    /// Scoped to the category being generated.
    pub async fn existing_texts(&self, category: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT question_sv FROM questions WHERE category = ?")
                .bind(category)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(t,)| t).collect())
    }

    /// Store a validation verdict, superseding any previous one.
    pub async fn set_validation(
        &self,
        id: &str,
        result: &ValidationResult,
        freshness: &FreshnessFields,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE questions SET validated = ?, validation_result = ?, \
             time_sensitive = ?, best_before_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(result.is_valid)
        .bind(serde_json::to_string(result)?)
        .bind(freshness.time_sensitive)
        .bind(freshness.best_before_at)
        .bind(epoch_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply provider-proposed edits in place. Absent fields keep their
    /// stored values.
    pub async fn apply_edits(&self, id: &str, edits: &ProposedEdits) -> Result<()> {
        if edits.is_empty() {
            return Ok(());
        }
        let Some(row) = self.get(id).await? else {
            return Err(anyhow!("question {id} not found"));
        };

        let options_sv = match &edits.options_sv {
            Some(options) => serde_json::to_string(options)?,
            None => row.options_sv.clone(),
        };
        let options_en = match &edits.options_en {
            Some(options) => serde_json::to_string(options)?,
            None => row.options_en.clone(),
        };

        sqlx::query(
            "UPDATE questions SET question_sv = ?, question_en = ?, options_sv = ?, \
             options_en = ?, correct_option = ?, explanation_sv = ?, explanation_en = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(edits.question_sv.as_deref().unwrap_or(&row.question_sv))
        .bind(edits.question_en.as_deref().unwrap_or(&row.question_en))
        .bind(options_sv)
        .bind(options_en)
        .bind(edits.correct_option.unwrap_or(row.correct_option))
        .bind(edits.explanation_sv.as_deref().unwrap_or(&row.explanation_sv))
        .bind(edits.explanation_en.as_deref().unwrap_or(&row.explanation_en))
        .bind(epoch_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_quarantined(&self, id: &str, quarantined: bool) -> Result<()> {
        sqlx::query("UPDATE questions SET quarantined = ?, updated_at = ? WHERE id = ?")
            .bind(quarantined)
            .bind(epoch_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::model::{Provenance, ValidationContext};
    use crate::storage;

    fn candidate() -> Candidate {
        Candidate {
            question_sv: "Vilken är Frankrikes huvudstad?".into(),
            question_en: "What is the capital of France?".into(),
            options_sv: vec!["Paris".into(), "Rom".into(), "Berlin".into(), "Madrid".into()],
            options_en: vec!["Paris".into(), "Rome".into(), "Berlin".into(), "Madrid".into()],
            correct_option: 0,
            explanation_sv: "Paris är Frankrikes huvudstad.".into(),
            explanation_en: String::new(),
            background_sv: String::new(),
            background_en: String::new(),
            emoji: Some("🗼".into()),
            time_sensitive: None,
            best_before_date: None,
            provenance: Provenance {
                provider: "openai".into(),
                model: "gpt-4o-mini".into(),
            },
        }
    }

    fn criteria() -> GenerationCriteria {
        GenerationCriteria {
            amount: 5,
            category: "geografi".into(),
            age_group: "Adults".into(),
            difficulty: "medium".into(),
            target_audience: "Swedish".into(),
            provider: None,
        }
    }

    async fn store() -> QuestionStore {
        QuestionStore::new(storage::open_memory().await.unwrap())
    }

    #[tokio::test]
    async fn insert_normalizes_and_round_trips() {
        let store = store().await;
        let row = store
            .insert(
                &candidate(),
                &criteria(),
                &FreshnessFields::default(),
                "task-1",
                false,
            )
            .await
            .unwrap();

        assert_eq!(row.age_groups_vec(), vec!["adults".to_string()]);
        assert_eq!(row.target_audience, "swedish");
        assert_eq!(row.options_sv_vec().len(), 4);
        assert_eq!(row.emoji.as_deref(), Some("🗼"));
        assert!(!row.validated);
        assert!(!row.quarantined);
    }

    #[tokio::test]
    async fn existing_texts_are_scoped_to_category() {
        let store = store().await;
        store
            .insert(
                &candidate(),
                &criteria(),
                &FreshnessFields::default(),
                "task-1",
                false,
            )
            .await
            .unwrap();

        assert_eq!(store.existing_texts("geografi").await.unwrap().len(), 1);
        assert!(store.existing_texts("historia").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_result_supersedes_previous() {
        let store = store().await;
        let row = store
            .insert(
                &candidate(),
                &criteria(),
                &FreshnessFields::default(),
                "task-1",
                false,
            )
            .await
            .unwrap();

        let first = ValidationResult {
            is_valid: false,
            issues: vec!["fel svar".into()],
            validation_context: ValidationContext {
                provider: "anthropic".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        store
            .set_validation(&row.id, &first, &FreshnessFields::default())
            .await
            .unwrap();

        let second = ValidationResult {
            is_valid: true,
            validation_context: ValidationContext {
                provider: "gemini".into(),
                corrected: true,
                ..Default::default()
            },
            ..Default::default()
        };
        store
            .set_validation(&row.id, &second, &FreshnessFields::default())
            .await
            .unwrap();

        let row = store.get(&row.id).await.unwrap().unwrap();
        assert!(row.validated);
        let parsed = row.parsed_validation().unwrap();
        assert!(parsed.is_valid);
        assert!(parsed.issues.is_empty(), "old issues must not survive");
        assert_eq!(parsed.validation_context.provider, "gemini");
    }

    #[tokio::test]
    async fn edits_only_touch_present_fields() {
        let store = store().await;
        let row = store
            .insert(
                &candidate(),
                &criteria(),
                &FreshnessFields::default(),
                "task-1",
                false,
            )
            .await
            .unwrap();

        let edits = ProposedEdits {
            correct_option: Some(2),
            explanation_sv: Some("Berlin är faktiskt fel, Paris stämmer.".into()),
            ..Default::default()
        };
        store.apply_edits(&row.id, &edits).await.unwrap();

        let updated = store.get(&row.id).await.unwrap().unwrap();
        assert_eq!(updated.correct_option, 2);
        assert_eq!(updated.question_sv, row.question_sv);
        assert_eq!(updated.options_sv, row.options_sv);
    }
}
