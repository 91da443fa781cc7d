//! End-to-end pipeline tests over an in-memory database and scripted
//! providers: generation rounds, fallback, chaining, validation rotation,
//! auto-correction and the watchdog.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use quizd::config::{Config, DedupConfig, GenerationConfig, ProvidersConfig, WatchdogConfig};
use quizd::error::ProviderError;
use quizd::pipeline::{self, TaskContext};
use quizd::providers::cycler::ProviderCycler;
use quizd::providers::feedback::FeedbackStore;
use quizd::providers::{
    AmbiguityChecker, AmbiguityResult, Corrector, GenerationRequest, Provider, ProviderVerdict,
    SharedProvider,
};
use quizd::questions::model::{Candidate, ProposedEdits, Provenance, QuestionRow};
use quizd::questions::QuestionStore;
use quizd::rules::RuleStore;
use quizd::storage;
use quizd::tasks::model::{
    GenerationCriteria, GenerationOutcome, ValidationOutcome, ValidationPayload,
};
use quizd::tasks::{TaskKind, TaskRow, TaskStatus, TaskStore};

/// Distinct question texts; far enough apart that deduplication accepts them.
const POOL: [&str; 12] = [
    "Vilket grundämne har den kemiska beteckningen Fe?",
    "Vilken svensk författare skrev boken om Nils Holgersson?",
    "Vilket hav ligger mellan Sverige och Finland?",
    "Vilken planet i solsystemet ligger närmast solen?",
    "Vilket år landade människan första gången på månen?",
    "Vilken fågel är känd för att kunna härma mänskligt tal?",
    "Vilket land har flest invånare i världen?",
    "Vilken sport spelas varje sommar i Wimbledon?",
    "Vilket instrument har svarta och vita tangenter?",
    "Vilken flod rinner genom den franska huvudstaden?",
    "Vilket berg är det högsta i Skandinavien?",
    "Vilken färg får man om man blandar blått och gult?",
];

enum GenStep {
    /// Return candidates built from exactly these texts.
    Texts(Vec<String>),
    /// Fail with a non-transient error.
    Fail,
    /// Sleep, then fail.
    Hang(u64),
}

enum VerdictStep {
    Verdict(ProviderVerdict),
    /// Fail the validate call with a non-transient error.
    Fail,
}

struct MockProvider {
    name: String,
    max_items: usize,
    validates: bool,
    corrects: bool,
    checks_ambiguity: bool,
    script: Mutex<VecDeque<GenStep>>,
    verdicts: Mutex<VecDeque<VerdictStep>>,
    minted: AtomicUsize,
    correct_calls: AtomicUsize,
    ambiguity_calls: AtomicUsize,
}

impl MockProvider {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            max_items: 10,
            validates: true,
            corrects: false,
            checks_ambiguity: false,
            script: Mutex::new(VecDeque::new()),
            verdicts: Mutex::new(VecDeque::new()),
            minted: AtomicUsize::new(0),
            correct_calls: AtomicUsize::new(0),
            ambiguity_calls: AtomicUsize::new(0),
        }
    }

    fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    fn with_script(self, steps: Vec<GenStep>) -> Self {
        *self.script.lock().unwrap() = steps.into();
        self
    }

    fn with_verdicts(self, verdicts: Vec<ProviderVerdict>) -> Self {
        self.with_verdict_script(verdicts.into_iter().map(VerdictStep::Verdict).collect())
    }

    fn with_verdict_script(self, steps: Vec<VerdictStep>) -> Self {
        *self.verdicts.lock().unwrap() = steps.into();
        self
    }

    fn with_corrector(mut self) -> Self {
        self.corrects = true;
        self
    }

    fn with_ambiguity_checker(mut self) -> Self {
        self.checks_ambiguity = true;
        self
    }

    fn candidate(&self, text: &str) -> Candidate {
        candidate(text, &self.name)
    }

    fn mint(&self, n: usize) -> Vec<Candidate> {
        let start = self.minted.fetch_add(n, Ordering::SeqCst);
        (start..start + n)
            .map(|i| self.candidate(POOL[i % POOL.len()]))
            .collect()
    }

    fn bad_response(&self) -> ProviderError {
        ProviderError::BadResponse {
            provider: self.name.clone(),
            message: "scripted failure".into(),
        }
    }
}

fn candidate(text: &str, provider: &str) -> Candidate {
    Candidate {
        question_sv: text.to_string(),
        question_en: String::new(),
        options_sv: vec![
            "Svar ett".into(),
            "Svar två".into(),
            "Svar tre".into(),
            "Svar fyra".into(),
        ],
        options_en: Vec::new(),
        correct_option: 0,
        explanation_sv: "Detta är den korrekta förklaringen.".into(),
        explanation_en: String::new(),
        background_sv: String::new(),
        background_en: String::new(),
        emoji: None,
        time_sensitive: None,
        best_before_date: None,
        provenance: Provenance {
            provider: provider.to_string(),
            model: "mock-1".into(),
        },
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        "mock-1"
    }

    fn max_items_per_request(&self) -> usize {
        self.max_items
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn supports_validation(&self) -> bool {
        self.validates
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<Candidate>, ProviderError> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(GenStep::Texts(texts)) => {
                Ok(texts.iter().map(|t| self.candidate(t)).collect())
            }
            Some(GenStep::Fail) => Err(self.bad_response()),
            Some(GenStep::Hang(ms)) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Err(self.bad_response())
            }
            None => Ok(self.mint(request.batch_size)),
        }
    }

    async fn validate(&self, _question: &QuestionRow) -> Result<ProviderVerdict, ProviderError> {
        match self.verdicts.lock().unwrap().pop_front() {
            Some(VerdictStep::Verdict(verdict)) => Ok(verdict),
            Some(VerdictStep::Fail) => Err(self.bad_response()),
            None => Ok(ProviderVerdict {
                is_valid: true,
                ..Default::default()
            }),
        }
    }

    fn corrector(&self) -> Option<&dyn Corrector> {
        if self.corrects {
            Some(self)
        } else {
            None
        }
    }

    fn ambiguity_checker(&self) -> Option<&dyn AmbiguityChecker> {
        if self.checks_ambiguity {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl AmbiguityChecker for MockProvider {
    async fn check_ambiguity(
        &self,
        _question: &QuestionRow,
    ) -> Result<AmbiguityResult, ProviderError> {
        self.ambiguity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(AmbiguityResult {
            ambiguous: false,
            alternative_correct_options: Vec::new(),
        })
    }
}

#[async_trait]
impl Corrector for MockProvider {
    async fn correct(
        &self,
        _question: &QuestionRow,
        _issues: &[String],
    ) -> Result<ProposedEdits, ProviderError> {
        self.correct_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProposedEdits {
            question_sv: Some("Vilken stad är huvudstad i Norge?".into()),
            explanation_sv: Some("Oslo är Norges huvudstad.".into()),
            ..Default::default()
        })
    }
}

fn test_config() -> Config {
    Config {
        data_dir: std::env::temp_dir(),
        log: "info".into(),
        log_format: "pretty".into(),
        generation: GenerationConfig {
            auto_validate: false,
            ..Default::default()
        },
        watchdog: WatchdogConfig {
            idle_ms: 60_000,
            min_total_ms: 60_000,
            per_item_ms: 1_000,
            check_interval_ms: 100,
        },
        dedup: DedupConfig::default(),
        providers: ProvidersConfig::default(),
    }
}

async fn context(config: Config, providers: Vec<SharedProvider>) -> Arc<TaskContext> {
    let pool = storage::open_memory().await.unwrap();
    context_on(pool, config, providers)
}

fn context_on(
    pool: sqlx::SqlitePool,
    config: Config,
    providers: Vec<SharedProvider>,
) -> Arc<TaskContext> {
    Arc::new(TaskContext::new(
        Arc::new(config),
        TaskStore::new(pool.clone()),
        QuestionStore::new(pool.clone()),
        RuleStore::new(pool.clone()),
        FeedbackStore::new(pool),
        Arc::new(ProviderCycler::new(providers)),
    ))
}

fn criteria(amount: usize) -> GenerationCriteria {
    GenerationCriteria {
        amount,
        category: "Geografi".into(),
        age_group: "adults".into(),
        difficulty: "medium".into(),
        target_audience: "swedish".into(),
        provider: None,
    }
}

async fn wait_terminal(ctx: &TaskContext, id: &str) -> TaskRow {
    for _ in 0..400 {
        let row = ctx.tasks.get(id).await.unwrap().unwrap();
        if TaskStatus::is_terminal(&row.status) {
            return row;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("task {id} never reached a terminal state");
}

fn generation_outcome(row: &TaskRow) -> GenerationOutcome {
    serde_json::from_str(row.result.as_deref().expect("result")).expect("parsable outcome")
}

fn validation_outcome(row: &TaskRow) -> ValidationOutcome {
    serde_json::from_str(row.result.as_deref().expect("result")).expect("parsable outcome")
}

// ─── Generation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn generation_reaches_the_requested_amount_over_rounds() {
    let provider = Arc::new(MockProvider::new("alpha").with_max_items(5));
    let ctx = context(test_config(), vec![provider]).await;

    let task = pipeline::submit_generation(ctx.clone(), criteria(6))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = generation_outcome(&row);
    assert_eq!(outcome.requested, 6);
    assert_eq!(outcome.accepted, 6);
    assert_eq!(outcome.shortfall, 0);
    assert_eq!(outcome.rounds, 2, "5 per call needs two rounds for 6");
    assert_eq!(outcome.providers_used, vec!["alpha".to_string()]);

    let questions = ctx.questions.get_many(&outcome.question_ids).await.unwrap();
    assert_eq!(questions.len(), 6);
    assert!(questions.iter().all(|q| !q.validated && !q.quarantined));
    assert!(questions.iter().all(|q| q.category == "Geografi"));
}

#[tokio::test]
async fn generation_reports_shortfall_when_every_round_repeats_itself() {
    let batch: Vec<String> = POOL[..3].iter().map(|t| t.to_string()).collect();
    let provider = Arc::new(MockProvider::new("alpha").with_script(vec![
        GenStep::Texts(batch.clone()),
        GenStep::Texts(batch.clone()),
        GenStep::Texts(batch.clone()),
    ]));
    let ctx = context(test_config(), vec![provider]).await;

    let task = pipeline::submit_generation(ctx.clone(), criteria(5))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed", "shortfall is not a failure");
    let outcome = generation_outcome(&row);
    assert_eq!(outcome.accepted, 3);
    assert_eq!(outcome.shortfall, 2);
    assert_eq!(outcome.duplicates_blocked, 6, "two full repeat rounds");
}

#[tokio::test]
async fn generation_falls_through_to_the_next_provider() {
    let alpha = Arc::new(MockProvider::new("alpha").with_script(vec![GenStep::Fail]));
    let beta = Arc::new(MockProvider::new("beta"));
    let ctx = context(test_config(), vec![alpha, beta]).await;

    let task = pipeline::submit_generation(ctx.clone(), criteria(3))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = generation_outcome(&row);
    assert_eq!(outcome.accepted, 3);
    assert_eq!(outcome.providers_used, vec!["beta".to_string()]);
}

#[tokio::test]
async fn preferred_provider_leads_every_round() {
    // Small batches force multiple rounds; the preference must hold for all
    // of them, not just the first.
    let alpha = Arc::new(MockProvider::new("alpha").with_max_items(3));
    let beta = Arc::new(MockProvider::new("beta"));
    let fallback = beta.clone();
    let ctx = context(test_config(), vec![alpha, beta]).await;

    let mut crit = criteria(6);
    crit.provider = Some("alpha".into());
    let task = pipeline::submit_generation(ctx.clone(), crit).await.unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = generation_outcome(&row);
    assert_eq!(outcome.accepted, 6);
    assert_eq!(outcome.rounds, 2, "3 per call needs two rounds for 6");
    assert_eq!(outcome.providers_used, vec!["alpha".to_string()]);
    assert_eq!(
        fallback.minted.load(Ordering::SeqCst),
        0,
        "the fallback must stay idle while the preferred provider is healthy"
    );
}

#[tokio::test]
async fn completed_generation_chains_a_validation_task() {
    let alpha = Arc::new(MockProvider::new("alpha"));
    let beta = Arc::new(MockProvider::new("beta"));
    let mut config = test_config();
    config.generation.auto_validate = true;
    let ctx = context(config, vec![alpha, beta]).await;

    let task = pipeline::submit_generation(ctx.clone(), criteria(3))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;
    assert_eq!(row.status, "completed");

    let outcome = generation_outcome(&row);
    let vtask_id = outcome.validation_task_id.expect("chained task id");
    let vrow = wait_terminal(&ctx, &vtask_id).await;
    assert_eq!(vrow.status, "completed");

    let voutcome = validation_outcome(&vrow);
    assert_eq!(voutcome.validated, 3);
    assert_eq!(voutcome.skipped, 0);

    // The generator is excluded from its own validation pool.
    let questions = ctx.questions.get_many(&outcome.question_ids).await.unwrap();
    for q in &questions {
        let result = q.parsed_validation().expect("validation stored");
        assert_eq!(result.validation_context.provider, "beta");
        assert!(q.validated);
    }
}

#[tokio::test]
async fn watchdog_fails_an_idle_generation_task() {
    let provider = Arc::new(MockProvider::new("alpha").with_script(vec![
        GenStep::Hang(500),
        GenStep::Hang(500),
        GenStep::Hang(500),
        GenStep::Hang(500),
        GenStep::Hang(500),
        GenStep::Hang(500),
    ]));
    let mut config = test_config();
    config.watchdog.idle_ms = 200;
    config.watchdog.check_interval_ms = 100;
    let ctx = context(config, vec![provider]).await;

    let task = pipeline::submit_generation(ctx.clone(), criteria(3))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "failed");
    let error = row.error.expect("watchdog reason");
    assert!(
        error.contains("ingen aktivitet"),
        "unexpected reason: {error}"
    );
}

#[tokio::test]
async fn queued_task_can_be_stopped() {
    let ctx = context(test_config(), vec![Arc::new(MockProvider::new("alpha"))]).await;
    let payload = serde_json::to_string(&criteria(3)).unwrap();
    let task = ctx
        .tasks
        .create(TaskKind::Generation, &payload)
        .await
        .unwrap();

    assert!(pipeline::stop_task(&ctx, &task.id, "stoppad av operatör")
        .await
        .unwrap());
    let row = ctx.tasks.get(&task.id).await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
    assert_eq!(row.error.as_deref(), Some("stoppad av operatör"));

    // A second stop is a no-op on the terminal row.
    assert!(!pipeline::stop_task(&ctx, &task.id, "igen").await.unwrap());
}

// ─── Validation ──────────────────────────────────────────────────────────────

async fn insert_questions(ctx: &TaskContext, texts: &[&str]) -> Vec<String> {
    let mut ids = Vec::new();
    for text in texts {
        let row = ctx
            .questions
            .insert(
                &candidate(text, "alpha"),
                &criteria(texts.len()),
                &Default::default(),
                "seed-task",
                false,
            )
            .await
            .unwrap();
        ids.push(row.id);
    }
    ids
}

fn validation_payload(ids: Vec<String>, generators: &[&str]) -> ValidationPayload {
    ValidationPayload {
        question_ids: ids,
        generator_providers: generators.iter().map(|s| s.to_string()).collect(),
        criteria: criteria(0),
    }
}

#[tokio::test]
async fn validation_marks_valid_and_invalid_items() {
    let validator = Arc::new(MockProvider::new("beta").with_verdicts(vec![
        ProviderVerdict {
            is_valid: true,
            ..Default::default()
        },
        ProviderVerdict {
            is_valid: false,
            issues: vec!["Fel faktauppgift i frågan.".into()],
            ..Default::default()
        },
    ]));
    let ctx = context(test_config(), vec![validator]).await;
    let ids = insert_questions(&ctx, &[POOL[0], POOL[1]]).await;

    let task = pipeline::submit_validation(ctx.clone(), validation_payload(ids.clone(), &[]))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = validation_outcome(&row);
    assert_eq!(outcome.validated, 1);
    assert_eq!(outcome.invalid, 1);
    assert_eq!(outcome.corrected, 0);

    let second = ctx.questions.get(&ids[1]).await.unwrap().unwrap();
    assert!(!second.validated);
    let result = second.parsed_validation().unwrap();
    assert!(result.issues.iter().any(|i| i.contains("faktauppgift")));
}

#[tokio::test]
async fn ambiguity_is_only_probed_on_valid_items() {
    let validator = Arc::new(
        MockProvider::new("beta")
            .with_ambiguity_checker()
            .with_verdicts(vec![
                ProviderVerdict {
                    is_valid: true,
                    ..Default::default()
                },
                ProviderVerdict {
                    is_valid: false,
                    issues: vec!["Fel faktauppgift i frågan.".into()],
                    ..Default::default()
                },
            ]),
    );
    let checker = validator.clone();
    let ctx = context(test_config(), vec![validator]).await;
    let ids = insert_questions(&ctx, &[POOL[0], POOL[1]]).await;

    let task = pipeline::submit_validation(ctx.clone(), validation_payload(ids, &[]))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = validation_outcome(&row);
    assert_eq!(outcome.validated, 1);
    assert_eq!(outcome.invalid, 1);
    assert_eq!(
        checker.ambiguity_calls.load(Ordering::SeqCst),
        1,
        "an already-invalid item needs no ambiguity probe"
    );
}

#[tokio::test]
async fn validation_skips_the_batch_when_the_pool_excludes_every_provider() {
    let ctx = context(test_config(), vec![Arc::new(MockProvider::new("alpha"))]).await;
    let ids = insert_questions(&ctx, &[POOL[0], POOL[1], POOL[2]]).await;

    let task = pipeline::submit_validation(ctx.clone(), validation_payload(ids.clone(), &["alpha"]))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed", "an empty pool skips, never fails");
    let outcome = validation_outcome(&row);
    assert_eq!(outcome.skipped, 3);
    assert_eq!(outcome.validated + outcome.invalid, 0);

    // Items stay untouched for a later pass.
    for id in &ids {
        let q = ctx.questions.get(id).await.unwrap().unwrap();
        assert!(!q.validated);
        assert!(q.validation_result.is_none());
    }
}

#[tokio::test]
async fn invalid_item_is_corrected_at_most_once() {
    let pool = storage::open_memory().await.unwrap();
    // Auto-correction is off by default; enable it via the global rule set.
    let rules = serde_json::json!({
        "enabled": true,
        "auto_correction": {"enabled": true}
    });
    sqlx::query("INSERT INTO ai_rule_sets (scope_type, scope_id, config) VALUES ('global', 'global', ?)")
        .bind(rules.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let validator = Arc::new(
        MockProvider::new("beta")
            .with_corrector()
            .with_verdicts(vec![ProviderVerdict {
                is_valid: false,
                issues: vec!["Fel huvudstad angiven.".into()],
                ..Default::default()
            }]),
    );
    let counter = validator.clone();
    let ctx = context_on(pool, test_config(), vec![validator]);
    let ids = insert_questions(&ctx, &[POOL[9]]).await;

    let task = pipeline::submit_validation(ctx.clone(), validation_payload(ids.clone(), &[]))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = validation_outcome(&row);
    assert_eq!(outcome.corrected, 1);
    assert_eq!(outcome.validated, 1, "re-assessment after the fix passes");
    assert_eq!(counter.correct_calls.load(Ordering::SeqCst), 1);

    let q = ctx.questions.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(q.question_sv, "Vilken stad är huvudstad i Norge?");
    let result = q.parsed_validation().unwrap();
    assert!(result.validation_context.corrected);
    assert!(q.validated);
}

#[tokio::test]
async fn correction_happens_once_even_across_provider_rotation() {
    let pool = storage::open_memory().await.unwrap();
    let rules = serde_json::json!({"auto_correction": {"enabled": true}});
    sqlx::query("INSERT INTO ai_rule_sets (scope_type, scope_id, config) VALUES ('global', 'global', ?)")
        .bind(rules.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let invalid = || ProviderVerdict {
        is_valid: false,
        issues: vec!["Fel huvudstad angiven.".into()],
        ..Default::default()
    };
    // beta corrects the item, then errors on the re-assessment; gamma takes
    // over and must not correct a second time.
    let beta = Arc::new(
        MockProvider::new("beta")
            .with_corrector()
            .with_verdict_script(vec![VerdictStep::Verdict(invalid()), VerdictStep::Fail]),
    );
    let gamma = Arc::new(
        MockProvider::new("gamma")
            .with_corrector()
            .with_verdicts(vec![invalid()]),
    );
    let (first, second) = (beta.clone(), gamma.clone());
    let ctx = context_on(pool, test_config(), vec![beta, gamma]);
    let ids = insert_questions(&ctx, &[POOL[9]]).await;

    let task = pipeline::submit_validation(ctx.clone(), validation_payload(ids.clone(), &[]))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    assert_eq!(row.status, "completed");
    let outcome = validation_outcome(&row);
    assert_eq!(outcome.corrected, 1);
    assert_eq!(outcome.invalid, 1, "gamma's verdict stands without a second fix");
    assert_eq!(first.correct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        second.correct_calls.load(Ordering::SeqCst),
        0,
        "one correction per item per pass"
    );

    // The rotated-to provider graded the corrected content and its verdict
    // carries the correction marker.
    let q = ctx.questions.get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(q.question_sv, "Vilken stad är huvudstad i Norge?");
    let result = q.parsed_validation().unwrap();
    assert!(result.validation_context.corrected);
    assert_eq!(result.validation_context.provider, "gamma");
}

#[tokio::test]
async fn invalid_item_without_corrector_keeps_its_verdict() {
    let pool = storage::open_memory().await.unwrap();
    let rules = serde_json::json!({"auto_correction": {"enabled": true}});
    sqlx::query("INSERT INTO ai_rule_sets (scope_type, scope_id, config) VALUES ('global', 'global', ?)")
        .bind(rules.to_string())
        .execute(&pool)
        .await
        .unwrap();

    // No corrector capability: the invalid verdict stands unmodified.
    let validator = Arc::new(MockProvider::new("beta").with_verdicts(vec![ProviderVerdict {
        is_valid: false,
        issues: vec!["Tvetydig fråga.".into()],
        ..Default::default()
    }]));
    let ctx = context_on(pool, test_config(), vec![validator]);
    let ids = insert_questions(&ctx, &[POOL[0]]).await;

    let task = pipeline::submit_validation(ctx.clone(), validation_payload(ids, &[]))
        .await
        .unwrap();
    let row = wait_terminal(&ctx, &task.id).await;

    let outcome = validation_outcome(&row);
    assert_eq!(outcome.invalid, 1);
    assert_eq!(outcome.corrected, 0);
}
