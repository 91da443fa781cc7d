//! Task drivers: submit rows, spawn orchestrators, attach watchdogs, write
//! terminal state exactly once.

pub mod generation;
pub mod validation;
pub mod watchdog;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::config::Config;
use crate::error::PipelineError;
use crate::providers::cycler::SharedCycler;
use crate::providers::feedback::FeedbackStore;
use crate::questions::QuestionStore;
use crate::rules::RuleStore;
use crate::tasks::model::{GenerationCriteria, TaskKind, TaskRow, ValidationPayload};
use crate::tasks::TaskStore;
use watchdog::{TaskHandle, WatchdogBudget};

/// Shared services every task run needs.
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<Config>,
    pub tasks: TaskStore,
    pub questions: QuestionStore,
    pub rules: RuleStore,
    pub feedback: FeedbackStore,
    pub cycler: SharedCycler,
    /// Abort handles of currently running tasks, for operator stops.
    live: Arc<Mutex<HashMap<String, Arc<TaskHandle>>>>,
}

impl TaskContext {
    pub fn new(
        config: Arc<Config>,
        tasks: TaskStore,
        questions: QuestionStore,
        rules: RuleStore,
        feedback: FeedbackStore,
        cycler: SharedCycler,
    ) -> Self {
        Self {
            config,
            tasks,
            questions,
            rules,
            feedback,
            cycler,
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn register(&self, task_id: &str, handle: Arc<TaskHandle>) {
        if let Ok(mut live) = self.live.lock() {
            live.insert(task_id.to_string(), handle);
        }
    }

    fn unregister(&self, task_id: &str) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(task_id);
        }
    }

    fn live_handle(&self, task_id: &str) -> Option<Arc<TaskHandle>> {
        self.live.lock().ok().and_then(|live| live.get(task_id).cloned())
    }
}

/// Validate criteria, insert the queued row and spawn the run. Returns the
/// row immediately; callers poll it for progress.
pub async fn submit_generation(
    ctx: Arc<TaskContext>,
    criteria: GenerationCriteria,
) -> Result<TaskRow> {
    if criteria.amount == 0 {
        bail!("amount must be at least 1");
    }
    let max = ctx.config.generation.max_amount;
    if criteria.amount > max {
        bail!("amount {} exceeds the maximum of {max}", criteria.amount);
    }
    if criteria.category.trim().is_empty() {
        bail!("category is required");
    }

    let payload = serde_json::to_string(&criteria)?;
    let task = ctx.tasks.create(TaskKind::Generation, &payload).await?;
    tracing::info!(task_id = %task.id, amount = criteria.amount, category = %criteria.category, "generation task queued");
    spawn_generation(ctx, task.clone());
    Ok(task)
}

/// Insert a queued validation task for already-persisted questions and spawn
/// the run.
pub async fn submit_validation(
    ctx: Arc<TaskContext>,
    payload: ValidationPayload,
) -> Result<TaskRow> {
    if payload.question_ids.is_empty() {
        bail!("at least one question id is required");
    }
    let raw = serde_json::to_string(&payload)?;
    let task = ctx.tasks.create(TaskKind::Validation, &raw).await?;
    tracing::info!(task_id = %task.id, items = payload.question_ids.len(), "validation task queued");
    spawn_validation(ctx, task.clone());
    Ok(task)
}

/// Abort a task: running tasks via their abort flag, queued ones directly in
/// the store. Completed/failed tasks are left alone.
pub async fn stop_task(ctx: &TaskContext, task_id: &str, reason: &str) -> Result<bool> {
    if let Some(handle) = ctx.live_handle(task_id) {
        handle.abort(reason);
    }
    let stopped = ctx.tasks.fail(task_id, reason).await?;
    if stopped {
        tracing::info!(task_id = %task_id, reason = %reason, "task stopped");
    }
    Ok(stopped)
}

pub fn spawn_generation(ctx: Arc<TaskContext>, task: TaskRow) {
    tokio::spawn(async move { drive_generation(ctx, task).await });
}

pub fn spawn_validation(ctx: Arc<TaskContext>, task: TaskRow) {
    tokio::spawn(async move { drive_validation(ctx, task).await });
}

pub async fn drive_generation(ctx: Arc<TaskContext>, task: TaskRow) {
    let criteria: GenerationCriteria = match serde_json::from_str(&task.payload) {
        Ok(criteria) => criteria,
        Err(e) => {
            tracing::error!(task_id = %task.id, err = %e, "unparsable generation payload");
            let _ = ctx.tasks.fail(&task.id, &format!("ogiltig uppgift: {e}")).await;
            return;
        }
    };

    if !claim(&ctx, &task.id).await {
        return;
    }

    let handle = TaskHandle::new();
    ctx.register(&task.id, handle.clone());
    let budget = WatchdogBudget::for_amount(&ctx.config.watchdog, criteria.amount);
    let wd = watchdog::attach(
        ctx.tasks.clone(),
        task.id.clone(),
        handle.clone(),
        budget,
        ctx.config.watchdog.check_interval_ms,
    );

    match generation::run(&ctx, &task.id, &criteria, &handle).await {
        Ok(mut outcome) => {
            // Chain validation before completing so the result row can point
            // at the follow-up task.
            if ctx.config.generation.auto_validate && !outcome.question_ids.is_empty() {
                let payload = ValidationPayload {
                    question_ids: outcome.question_ids.clone(),
                    generator_providers: outcome.providers_used.clone(),
                    criteria: criteria.clone(),
                };
                match submit_validation(ctx.clone(), payload).await {
                    Ok(vtask) => outcome.validation_task_id = Some(vtask.id),
                    Err(e) => {
                        tracing::error!(task_id = %task.id, err = %e, "failed to chain validation task");
                    }
                }
            }
            finish(&ctx, &task.id, &outcome).await;
        }
        Err(PipelineError::Aborted { reason }) => {
            tracing::warn!(task_id = %task.id, reason = %reason, "generation aborted");
        }
        Err(e) => {
            tracing::error!(task_id = %task.id, err = %e, "generation failed");
            let _ = ctx.tasks.fail(&task.id, &e.to_string()).await;
        }
    }

    handle.finish();
    wd.abort();
    ctx.unregister(&task.id);
}

pub async fn drive_validation(ctx: Arc<TaskContext>, task: TaskRow) {
    let payload: ValidationPayload = match serde_json::from_str(&task.payload) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(task_id = %task.id, err = %e, "unparsable validation payload");
            let _ = ctx.tasks.fail(&task.id, &format!("ogiltig uppgift: {e}")).await;
            return;
        }
    };

    if !claim(&ctx, &task.id).await {
        return;
    }

    let handle = TaskHandle::new();
    ctx.register(&task.id, handle.clone());
    let budget = WatchdogBudget::for_amount(&ctx.config.watchdog, payload.question_ids.len());
    let wd = watchdog::attach(
        ctx.tasks.clone(),
        task.id.clone(),
        handle.clone(),
        budget,
        ctx.config.watchdog.check_interval_ms,
    );

    match validation::run(&ctx, &task.id, &payload, &handle).await {
        Ok(outcome) => finish(&ctx, &task.id, &outcome).await,
        Err(PipelineError::Aborted { reason }) => {
            tracing::warn!(task_id = %task.id, reason = %reason, "validation aborted");
        }
        Err(e) => {
            tracing::error!(task_id = %task.id, err = %e, "validation failed");
            let _ = ctx.tasks.fail(&task.id, &e.to_string()).await;
        }
    }

    handle.finish();
    wd.abort();
    ctx.unregister(&task.id);
}

async fn claim(ctx: &TaskContext, task_id: &str) -> bool {
    match ctx.tasks.mark_processing(task_id).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(task_id = %task_id, "task is not queued — skipping run");
            false
        }
        Err(e) => {
            tracing::error!(task_id = %task_id, err = %e, "failed to claim task");
            false
        }
    }
}

async fn finish<T: serde::Serialize>(ctx: &TaskContext, task_id: &str, outcome: &T) {
    match serde_json::to_string(outcome) {
        Ok(result) => {
            if let Err(e) = ctx.tasks.complete(task_id, &result).await {
                tracing::error!(task_id = %task_id, err = %e, "failed to complete task");
            }
        }
        Err(e) => {
            let _ = ctx.tasks.fail(task_id, &format!("oserialiserbart resultat: {e}")).await;
        }
    }
}
