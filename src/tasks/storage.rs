//! Persistence for background task rows.
//!
//! Status transitions are enforced in SQL rather than in memory: terminal
//! rows (`completed`, `failed`) reject further progress writes and a second
//! terminal write is a no-op, so a watchdog-failed task and its still-running
//! pipeline cannot fight over the row.

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;

use super::model::{epoch_ms, new_task_id, Progress, TaskKind, TaskRow, TaskStatus};

#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new queued task and return its row.
    pub async fn create(&self, kind: TaskKind, payload: &str) -> Result<TaskRow> {
        let id = new_task_id();
        let now = epoch_ms();
        sqlx::query(
            "INSERT INTO background_tasks (id, kind, status, payload, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(kind.as_str())
        .bind(TaskStatus::Queued.as_str())
        .bind(payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| anyhow!("task {id} vanished after insert"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<TaskRow>> {
        let row = sqlx::query_as::<_, TaskRow>(
            "SELECT id, kind, status, payload, progress, result, error, \
             created_at, updated_at, finished_at \
             FROM background_tasks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Most recent tasks, optionally filtered by status.
    pub async fn list(&self, status: Option<&str>, limit: i64) -> Result<Vec<TaskRow>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, TaskRow>(
                    "SELECT id, kind, status, payload, progress, result, error, \
                     created_at, updated_at, finished_at \
                     FROM background_tasks WHERE status = ? \
                     ORDER BY created_at DESC LIMIT ?",
                )
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, TaskRow>(
                    "SELECT id, kind, status, payload, progress, result, error, \
                     created_at, updated_at, finished_at \
                     FROM background_tasks ORDER BY created_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// Move a queued task to `processing`. Returns false if the row was not
    /// queued (already picked up, or already terminal).
    pub async fn mark_processing(&self, id: &str) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE background_tasks SET status = 'processing', updated_at = ? \
             WHERE id = ? AND status = 'queued'",
        )
        .bind(epoch_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Write a progress snapshot. Updates against a terminal row are silently
    /// dropped; returns whether the write landed.
    pub async fn update_progress(&self, id: &str, progress: &Progress) -> Result<bool> {
        let raw = serde_json::to_string(progress)?;
        let res = sqlx::query(
            "UPDATE background_tasks SET progress = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(raw)
        .bind(epoch_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let landed = res.rows_affected() > 0;
        if !landed {
            tracing::debug!(task_id = %id, "progress update dropped — task already terminal");
        }
        Ok(landed)
    }

    /// Mark a task completed with its result JSON. No-op if already terminal.
    pub async fn complete(&self, id: &str, result: &str) -> Result<bool> {
        let now = epoch_ms();
        let res = sqlx::query(
            "UPDATE background_tasks SET status = 'completed', result = ?, \
             updated_at = ?, finished_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(result)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Mark a task failed with an error message. No-op if already terminal,
    /// so the first failure reason (e.g. a watchdog trip) wins.
    pub async fn fail(&self, id: &str, error: &str) -> Result<bool> {
        let now = epoch_ms();
        let res = sqlx::query(
            "UPDATE background_tasks SET status = 'failed', error = ?, \
             updated_at = ?, finished_at = ? \
             WHERE id = ? AND status NOT IN ('completed', 'failed')",
        )
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Non-terminal tasks whose last update is older than `cutoff_ms`.
    /// Used by the startup sweep to fail rows orphaned by a crash.
    pub async fn stale_active(&self, cutoff_ms: i64) -> Result<Vec<TaskRow>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT id, kind, status, payload, progress, result, error, \
             created_at, updated_at, finished_at \
             FROM background_tasks \
             WHERE status IN ('queued', 'processing') AND updated_at < ? \
             ORDER BY updated_at ASC",
        )
        .bind(cutoff_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage;

    async fn store() -> TaskStore {
        let pool = storage::open_memory().await.unwrap();
        TaskStore::new(pool)
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let store = store().await;
        let task = store
            .create(TaskKind::Generation, r#"{"amount":5}"#)
            .await
            .unwrap();
        assert_eq!(task.status, "queued");
        assert_eq!(task.kind, "generation");

        let fetched = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(fetched.payload, r#"{"amount":5}"#);
    }

    #[tokio::test]
    async fn mark_processing_only_from_queued() {
        let store = store().await;
        let task = store.create(TaskKind::Generation, "{}").await.unwrap();
        assert!(store.mark_processing(&task.id).await.unwrap());
        // Second claim is rejected.
        assert!(!store.mark_processing(&task.id).await.unwrap());
    }

    #[tokio::test]
    async fn progress_after_terminal_is_dropped() {
        let store = store().await;
        let task = store.create(TaskKind::Generation, "{}").await.unwrap();
        store.mark_processing(&task.id).await.unwrap();

        let progress = Progress::new("genererar frågor", 2, 10);
        assert!(store.update_progress(&task.id, &progress).await.unwrap());

        store.fail(&task.id, "watchdog timeout").await.unwrap();
        assert!(!store.update_progress(&task.id, &progress).await.unwrap());

        // The failed row keeps its last progress and error.
        let row = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error.as_deref(), Some("watchdog timeout"));
        assert_eq!(row.parsed_progress().unwrap().completed, 2);
    }

    #[tokio::test]
    async fn first_terminal_write_wins() {
        let store = store().await;
        let task = store.create(TaskKind::Validation, "{}").await.unwrap();
        store.mark_processing(&task.id).await.unwrap();

        assert!(store.fail(&task.id, "watchdog timeout").await.unwrap());
        // The pipeline finishing afterwards must not flip the status.
        assert!(!store.complete(&task.id, "{}").await.unwrap());

        let row = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert!(row.result.is_none());
    }

    #[tokio::test]
    async fn stale_sweep_finds_only_old_active_rows() {
        let store = store().await;
        let task = store.create(TaskKind::Generation, "{}").await.unwrap();
        store.mark_processing(&task.id).await.unwrap();

        let stale = store.stale_active(epoch_ms() + 1).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, task.id);

        store.fail(&task.id, "orphaned").await.unwrap();
        let stale = store.stale_active(epoch_ms() + 1).await.unwrap();
        assert!(stale.is_empty());
    }
}
