//! Generation orchestrator: rounds of provider calls feeding
//! dedup → rules → persistence until the requested amount is reached.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use super::watchdog::TaskHandle;
use super::TaskContext;
use crate::dedup::{self, CorpusSnapshot};
use crate::error::PipelineError;
use crate::freshness::{self, FreshnessInput};
use crate::providers::cycler::RANDOM_PROVIDER;
use crate::providers::GenerationRequest;
use crate::rules::evaluator::{self, RuleSubject};
use crate::tasks::model::{epoch_ms, GenerationCriteria, GenerationOutcome, Progress};

/// Stop after this many consecutive rounds that accept nothing.
const STALL_ROUNDS: usize = 2;

/// How many existing texts are forwarded to the prompt's avoid list.
const AVOID_SAMPLE: usize = 50;

/// Drive one generation task to completion.
///
/// Returns the outcome for the driver to persist, or
/// [`PipelineError::Aborted`] when the watchdog (or an operator stop) already
/// wrote the terminal state.
pub async fn run(
    ctx: &TaskContext,
    task_id: &str,
    criteria: &GenerationCriteria,
    handle: &Arc<TaskHandle>,
) -> Result<GenerationOutcome, PipelineError> {
    let amount = criteria.amount;
    let max_rounds = ctx.config.generation.max_rounds(amount);

    ctx.tasks
        .update_progress(task_id, &Progress::new("förbereder", 0, amount))
        .await
        .map_err(PipelineError::Other)?;
    handle.touch();

    let rule_config = ctx.rules.load().await.map_err(PipelineError::Other)?;
    let freshness_config = rule_config.freshness_for(&criteria.target_audience);

    let existing = ctx
        .questions
        .existing_texts(&criteria.category)
        .await
        .map_err(PipelineError::Other)?;
    let avoid_texts: Vec<String> = existing
        .iter()
        .rev()
        .take(AVOID_SAMPLE)
        .cloned()
        .collect();
    let mut snapshot = CorpusSnapshot::new(existing);

    let cycle = ctx.cycler.generation_cycle(criteria.provider.as_deref());
    if cycle.is_empty() {
        return Err(PipelineError::ExhaustedProviders);
    }
    // A resolved preference pins the lead; an unknown one degrades to the
    // configured order, which rotates per round like the no-preference case.
    let pinned_lead = criteria.provider.as_deref().is_some_and(|name| {
        name.eq_ignore_ascii_case(RANDOM_PROVIDER)
            || cycle[0].name().eq_ignore_ascii_case(name)
    });

    let mut outcome = GenerationOutcome {
        requested: amount,
        ..Default::default()
    };
    let mut providers_used: BTreeSet<String> = BTreeSet::new();
    let mut stalled_rounds = 0usize;

    for round in 1..=max_rounds {
        if handle.is_aborted() {
            return Err(PipelineError::Aborted {
                reason: handle.abort_reason().unwrap_or_default(),
            });
        }
        let remaining = amount - outcome.question_ids.len();
        if remaining == 0 {
            break;
        }
        outcome.rounds = round;

        // A preferred provider leads every round; otherwise round r leads
        // with the r-th provider. Either way the rest of the cycle is
        // in-round fallback.
        let lead = if pinned_lead { 0 } else { round - 1 };
        let mut candidates = None;
        for offset in 0..cycle.len() {
            let provider = &cycle[(lead + offset) % cycle.len()];
            let batch_size = remaining.min(provider.max_items_per_request());
            handle.note_provider(provider.name());
            handle.note_batch_size(batch_size);

            let request = GenerationRequest {
                criteria: criteria.clone(),
                batch_size,
                avoid_texts: avoid_texts.clone(),
                freshness_guidance: freshness_config.guidance.clone(),
            };

            let attempt =
                crate::retry::retry_transient(&crate::retry::RetryConfig::default(), || {
                    provider.generate(&request)
                })
                .await;
            match attempt {
                Ok(batch) => {
                    tracing::info!(
                        task_id = %task_id,
                        provider = provider.name(),
                        round,
                        received = batch.len(),
                        "generation batch received"
                    );
                    providers_used.insert(provider.name().to_string());
                    let _ = ctx.feedback.record_success(provider.name()).await;
                    candidates = Some(batch);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %task_id,
                        provider = provider.name(),
                        round,
                        err = %e,
                        "generation call failed — trying next provider"
                    );
                    let _ = ctx.feedback.record_failure(provider.name()).await;
                }
            }
        }

        let Some(batch) = candidates else {
            stalled_rounds += 1;
            if stalled_rounds >= STALL_ROUNDS {
                tracing::warn!(task_id = %task_id, round, "stopping after consecutive empty rounds");
                break;
            }
            continue;
        };
        handle.touch();
        outcome.generated += batch.len();

        // Structural rejects count as rule filtering.
        let structurally_sound: Vec<_> = batch
            .into_iter()
            .filter(|c| {
                let issues = c.structural_issues();
                if issues.is_empty() {
                    true
                } else {
                    tracing::debug!(task_id = %task_id, ?issues, "candidate failed structural checks");
                    outcome.rule_filtered += 1;
                    false
                }
            })
            .collect();

        let deduped = dedup::filter_batch(
            structurally_sound,
            &mut snapshot,
            ctx.config.dedup.similarity_threshold,
        );
        outcome.duplicates_blocked += deduped.duplicate_count;

        let mut accepted_this_round = 0usize;
        for candidate in deduped.unique {
            if outcome.question_ids.len() >= amount {
                break;
            }
            let subject = RuleSubject::from_candidate(&candidate, criteria);
            let verdict = evaluator::evaluate(&subject, &rule_config);
            if !verdict.is_valid {
                tracing::debug!(task_id = %task_id, issues = ?verdict.issues, "candidate rejected by rules");
                outcome.rule_filtered += 1;
                continue;
            }

            let now = epoch_ms();
            let fields = freshness::resolve(
                &FreshnessInput {
                    time_sensitive: candidate.time_sensitive,
                    best_before_date: candidate.best_before_date.clone(),
                    best_before_at: None,
                    age_groups: vec![criteria.age_group.clone()],
                },
                &freshness_config,
                now,
            );
            let quarantined = freshness::is_expired(fields.best_before_at, now);

            let row = ctx
                .questions
                .insert(&candidate, criteria, &fields, task_id, quarantined)
                .await
                .map_err(PipelineError::Other)?;
            outcome.question_ids.push(row.id);
            accepted_this_round += 1;
        }

        if accepted_this_round == 0 {
            stalled_rounds += 1;
        } else {
            stalled_rounds = 0;
        }

        let progress = Progress::new("genererar frågor", outcome.question_ids.len(), amount)
            .with_details(json!({
                "round": round,
                "duplicates_blocked": outcome.duplicates_blocked,
                "rule_filtered": outcome.rule_filtered,
            }));
        ctx.tasks
            .update_progress(task_id, &progress)
            .await
            .map_err(PipelineError::Other)?;
        handle.touch();

        if stalled_rounds >= STALL_ROUNDS {
            tracing::warn!(task_id = %task_id, round, "stopping after consecutive zero-accept rounds");
            break;
        }
    }

    outcome.accepted = outcome.question_ids.len();
    outcome.shortfall = amount - outcome.accepted;
    outcome.providers_used = providers_used.into_iter().collect();

    tracing::info!(
        task_id = %task_id,
        requested = outcome.requested,
        accepted = outcome.accepted,
        shortfall = outcome.shortfall,
        duplicates_blocked = outcome.duplicates_blocked,
        rule_filtered = outcome.rule_filtered,
        rounds = outcome.rounds,
        "generation finished"
    );
    Ok(outcome)
}
