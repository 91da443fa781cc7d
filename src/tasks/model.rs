//! Background task data model.

use serde::{Deserialize, Serialize};

/// Generate a new ULID task id.
pub fn new_task_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Current epoch milliseconds.
pub fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Kind of background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Generation,
    Validation,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Validation => "validation",
        }
    }
}

/// Task lifecycle status. `Completed` and `Failed` are terminal and written
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(s: &str) -> bool {
        s == "completed" || s == "failed"
    }
}

/// One `background_tasks` row. JSON columns are kept as raw strings, the way
/// consumers poll them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub payload: String,          // JSON
    pub progress: Option<String>, // JSON Progress
    pub result: Option<String>,   // JSON
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub finished_at: Option<i64>,
}

impl TaskRow {
    pub fn parsed_progress(&self) -> Option<Progress> {
        self.progress
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// Fine-grained progress written into the task row after every discrete step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub phase: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Progress {
    pub fn new(phase: impl Into<String>, completed: usize, total: usize) -> Self {
        Self {
            completed,
            total,
            phase: phase.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Immutable input to one generation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationCriteria {
    pub amount: usize,
    pub category: String,
    pub age_group: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_target_audience")]
    pub target_audience: String,
    /// Preferred provider name, `Some("random")` to pick one from the cycle,
    /// or `None` for the configured order.
    #[serde(default)]
    pub provider: Option<String>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

fn default_target_audience() -> String {
    "swedish".to_string()
}

/// Result written to a completed generation task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub requested: usize,
    /// Raw candidates received from providers across all rounds.
    pub generated: usize,
    /// Candidates persisted (≤ requested).
    pub accepted: usize,
    /// Shortfall = requested - accepted, reported explicitly.
    pub shortfall: usize,
    pub duplicates_blocked: usize,
    pub rule_filtered: usize,
    pub rounds: usize,
    pub providers_used: Vec<String>,
    pub question_ids: Vec<String>,
    /// Id of the chained validation task, when one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_task_id: Option<String>,
}

/// Payload of a validation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPayload {
    pub question_ids: Vec<String>,
    /// Providers that generated any item in the batch — excluded from the
    /// validation pool.
    pub generator_providers: Vec<String>,
    pub criteria: GenerationCriteria,
}

/// Result written to a completed validation task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub validated: usize,
    pub invalid: usize,
    pub skipped: usize,
    pub corrected: usize,
}
