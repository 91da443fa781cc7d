//! Per-provider success/failure counters.
//!
//! Validation verdicts feed back into the ordering of the validation pool:
//! providers whose calls keep failing sink to the end of the cycle.

use std::collections::HashMap;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::tasks::model::epoch_ms;

/// Score assumed for a provider with no recorded history yet.
const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
}

impl FeedbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record_success(&self, provider: &str) -> Result<()> {
        self.record(provider, true).await
    }

    pub async fn record_failure(&self, provider: &str) -> Result<()> {
        self.record(provider, false).await
    }

    async fn record(&self, provider: &str, success: bool) -> Result<()> {
        let (s, f) = if success { (1, 0) } else { (0, 1) };
        sqlx::query(
            "INSERT INTO provider_feedback (provider, success, failure, last_used_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(provider) DO UPDATE SET \
               success = success + excluded.success, \
               failure = failure + excluded.failure, \
               last_used_at = excluded.last_used_at",
        )
        .bind(provider)
        .bind(s)
        .bind(f)
        .bind(epoch_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Success ratio per provider in [0, 1]. Providers without history are
    /// absent; callers treat them as [`score_or_neutral`] does.
    pub async fn scores(&self) -> Result<HashMap<String, f64>> {
        let rows: Vec<(String, i64, i64)> =
            sqlx::query_as("SELECT provider, success, failure FROM provider_feedback")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(provider, success, failure)| {
                let total = success + failure;
                let score = if total == 0 {
                    NEUTRAL_SCORE
                } else {
                    success as f64 / total as f64
                };
                (provider, score)
            })
            .collect())
    }
}

/// Score lookup with the neutral default for unknown providers.
pub fn score_or_neutral(scores: &HashMap<String, f64>, provider: &str) -> f64 {
    scores.get(provider).copied().unwrap_or(NEUTRAL_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    #[tokio::test]
    async fn scores_reflect_recorded_outcomes() {
        let store = FeedbackStore::new(storage::open_memory().await.unwrap());
        store.record_success("openai").await.unwrap();
        store.record_success("openai").await.unwrap();
        store.record_failure("openai").await.unwrap();
        store.record_failure("gemini").await.unwrap();

        let scores = store.scores().await.unwrap();
        assert!((score_or_neutral(&scores, "openai") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(score_or_neutral(&scores, "gemini"), 0.0);
        assert_eq!(score_or_neutral(&scores, "anthropic"), 0.5);
    }
}
