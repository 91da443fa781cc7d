//! Validation orchestrator: sequential per-item loop with provider rotation,
//! rule cross-checks, ambiguity detection and one-shot auto-correction.

use std::sync::Arc;

use serde_json::json;

use super::watchdog::TaskHandle;
use super::TaskContext;
use crate::error::PipelineError;
use crate::freshness::{self, FreshnessFields, FreshnessInput};
use crate::providers::SharedProvider;
use crate::questions::model::{QuestionRow, ValidationContext, ValidationResult};
use crate::rules::evaluator::{self, RuleSubject};
use crate::rules::RuleConfig;
use crate::tasks::model::{epoch_ms, Progress, ValidationOutcome, ValidationPayload};

/// Drive one validation task over its batch of persisted questions.
pub async fn run(
    ctx: &TaskContext,
    task_id: &str,
    payload: &ValidationPayload,
    handle: &Arc<TaskHandle>,
) -> Result<ValidationOutcome, PipelineError> {
    let rows = ctx
        .questions
        .get_many(&payload.question_ids)
        .await
        .map_err(PipelineError::Other)?;
    let total = rows.len();
    let mut outcome = ValidationOutcome::default();

    let rule_config = ctx.rules.load().await.map_err(PipelineError::Other)?;
    let scores = ctx.feedback.scores().await.map_err(PipelineError::Other)?;
    let pool = ctx
        .cycler
        .validation_pool(&payload.generator_providers, &scores);

    if pool.is_empty() {
        // A provider must not grade its own output; with nothing left in the
        // pool the whole batch is skipped, not failed.
        tracing::warn!(
            task_id = %task_id,
            excluded = ?payload.generator_providers,
            "validation pool is empty — skipping batch"
        );
        outcome.skipped = total;
        ctx.tasks
            .update_progress(
                task_id,
                &Progress::new("validering överhoppad", total, total)
                    .with_details(json!({"reason": "inga tillgängliga valideringsleverantörer"})),
            )
            .await
            .map_err(PipelineError::Other)?;
        return Ok(outcome);
    }

    let auto_correct = rule_config.auto_correction_enabled(&payload.criteria.target_audience);
    let freshness_config = rule_config.freshness_for(&payload.criteria.target_audience);

    let mut pool_idx = 0usize;
    let mut processed = 0usize;

    'items: for row in rows {
        if handle.is_aborted() {
            return Err(PipelineError::Aborted {
                reason: handle.abort_reason().unwrap_or_default(),
            });
        }

        // Rotate through the pool until one provider serves this item. The
        // corrected flag spans rotation: one correction per item per pass,
        // even when the correcting provider errors afterwards.
        let mut attempts = 0usize;
        let mut corrected = false;
        let mut current = row;
        loop {
            if attempts >= pool.len() {
                // Pool exhausted for this item: everything left is skipped.
                outcome.skipped = total - processed;
                tracing::warn!(
                    task_id = %task_id,
                    skipped = outcome.skipped,
                    "validation pool exhausted — skipping remaining items"
                );
                break 'items;
            }
            let provider = &pool[pool_idx % pool.len()];
            handle.note_provider(provider.name());

            match validate_item(
                ctx,
                provider,
                &current,
                &rule_config,
                auto_correct,
                &mut corrected,
            )
            .await
            {
                Ok(mut item) => {
                    let _ = ctx.feedback.record_success(provider.name()).await;
                    let fields = resolve_freshness(&item.result, &item.row, &freshness_config);
                    let expired = freshness::is_expired(fields.best_before_at, epoch_ms());
                    item.result.freshness = fields.clone();

                    ctx.questions
                        .set_validation(&item.row.id, &item.result, &fields)
                        .await
                        .map_err(PipelineError::Other)?;
                    if expired != item.row.quarantined {
                        ctx.questions
                            .set_quarantined(&item.row.id, expired)
                            .await
                            .map_err(PipelineError::Other)?;
                    }

                    if item.result.validation_context.corrected {
                        outcome.corrected += 1;
                    }
                    if item.result.is_valid {
                        outcome.validated += 1;
                    } else {
                        outcome.invalid += 1;
                    }
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %task_id,
                        provider = provider.name(),
                        question_id = %current.id,
                        err = %e,
                        "validation call failed — rotating provider"
                    );
                    let _ = ctx.feedback.record_failure(provider.name()).await;
                    pool_idx += 1;
                    attempts += 1;
                    // Edits may already be on disk; the next provider must
                    // see the corrected content, not the stale row.
                    if corrected {
                        if let Ok(Some(fresh)) = ctx.questions.get(&current.id).await {
                            current = fresh;
                        }
                    }
                }
            }
        }

        processed += 1;
        handle.touch();
        ctx.tasks
            .update_progress(
                task_id,
                &Progress::new("validerar frågor", processed, total).with_details(json!({
                    "validated": outcome.validated,
                    "invalid": outcome.invalid,
                    "corrected": outcome.corrected,
                })),
            )
            .await
            .map_err(PipelineError::Other)?;
    }

    tracing::info!(
        task_id = %task_id,
        validated = outcome.validated,
        invalid = outcome.invalid,
        skipped = outcome.skipped,
        corrected = outcome.corrected,
        "validation finished"
    );
    Ok(outcome)
}

struct ItemOutcome {
    /// Possibly re-fetched after correction.
    row: QuestionRow,
    result: ValidationResult,
}

/// Validate one item with one provider, applying at most one correction.
///
/// `corrected` is owned by the caller and survives provider rotation: once
/// set, no later attempt on the same item may correct again.
async fn validate_item(
    ctx: &TaskContext,
    provider: &SharedProvider,
    row: &QuestionRow,
    rule_config: &RuleConfig,
    auto_correct: bool,
    corrected: &mut bool,
) -> Result<ItemOutcome, crate::error::ProviderError> {
    let first = assess(provider, row, rule_config).await?;

    let correctable = !first.is_valid && auto_correct && !*corrected;
    let Some(corrector) = provider.corrector().filter(|_| correctable) else {
        return Ok(ItemOutcome {
            row: row.clone(),
            result: finalize(first, provider, *corrected),
        });
    };

    // One correction attempt per item per pass; a failed correction keeps
    // the uncorrected verdict instead of failing the item.
    let edits = match corrector.correct(row, &first.issues).await {
        Ok(edits) if !edits.is_empty() => edits,
        Ok(_) => {
            return Ok(ItemOutcome {
                row: row.clone(),
                result: finalize(first, provider, false),
            })
        }
        Err(e) => {
            tracing::warn!(question_id = %row.id, err = %e, "correction call failed — keeping original verdict");
            return Ok(ItemOutcome {
                row: row.clone(),
                result: finalize(first, provider, false),
            });
        }
    };

    if let Err(e) = ctx.questions.apply_edits(&row.id, &edits).await {
        tracing::warn!(question_id = %row.id, err = %e, "failed to apply correction");
        return Ok(ItemOutcome {
            row: row.clone(),
            result: finalize(first, provider, false),
        });
    }
    *corrected = true;

    let corrected_row = ctx
        .questions
        .get(&row.id)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| row.clone());
    let second = assess(provider, &corrected_row, rule_config).await?;
    Ok(ItemOutcome {
        row: corrected_row,
        result: finalize(second, provider, true),
    })
}

/// Provider verdict + independent rule verdict + optional ambiguity check,
/// merged into one draft result.
async fn assess(
    provider: &SharedProvider,
    row: &QuestionRow,
    rule_config: &RuleConfig,
) -> Result<ValidationResult, crate::error::ProviderError> {
    let verdict =
        crate::retry::retry_transient(&crate::retry::RetryConfig::default(), || {
            provider.validate(row)
        })
        .await?;

    let mut issues = verdict.issues;
    let mut is_valid = verdict.is_valid;

    // Rule violations force invalid regardless of the provider's opinion.
    let rule_verdict = evaluator::evaluate(&RuleSubject::from_row(row), rule_config);
    if !rule_verdict.is_valid {
        is_valid = false;
        issues.extend(rule_verdict.issues);
    }

    // Ambiguity is only probed on items that are still valid; an invalid
    // verdict already stands on its own.
    let mut alternatives = verdict.alternative_correct_options;
    if is_valid {
        if let Some(checker) = provider.ambiguity_checker() {
            // Ambiguity is advisory: a failed check never fails the item.
            match checker.check_ambiguity(row).await {
                Ok(ambiguity) if ambiguity.ambiguous => {
                    is_valid = false;
                    issues.push("Flera svarsalternativ kan vara korrekta.".to_string());
                    for alt in ambiguity.alternative_correct_options {
                        if !alternatives.contains(&alt) {
                            alternatives.push(alt);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(question_id = %row.id, err = %e, "ambiguity check failed — ignoring");
                }
            }
        } else if !alternatives.is_empty() {
            is_valid = false;
            issues.push("Flera svarsalternativ kan vara korrekta.".to_string());
        }
    }

    Ok(ValidationResult {
        is_valid,
        issues,
        suggestions: verdict.suggestions,
        proposed_edits: verdict.proposed_edits,
        alternative_correct_options: alternatives,
        freshness: FreshnessFields {
            time_sensitive: verdict.time_sensitive.unwrap_or(false),
            best_before_at: None,
            best_before_date: verdict.best_before_date,
        },
        validation_context: ValidationContext::default(),
    })
}

fn finalize(mut result: ValidationResult, provider: &SharedProvider, corrected: bool) -> ValidationResult {
    result.validation_context = ValidationContext {
        provider: provider.name().to_string(),
        model: provider.model_name().to_string(),
        corrected,
        validated_at: epoch_ms(),
    };
    result
}

fn resolve_freshness(
    result: &ValidationResult,
    row: &QuestionRow,
    config: &crate::freshness::FreshnessConfig,
) -> FreshnessFields {
    freshness::resolve(
        &FreshnessInput {
            time_sensitive: Some(result.freshness.time_sensitive || row.time_sensitive),
            best_before_date: result.freshness.best_before_date.clone(),
            best_before_at: row.best_before_at,
            age_groups: row.age_groups_vec(),
        },
        config,
        epoch_ms(),
    )
}
