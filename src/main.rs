use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use quizd::config::Config;
use quizd::pipeline::{self, watchdog, TaskContext};
use quizd::tasks::model::{GenerationCriteria, TaskStatus, ValidationPayload};
use quizd::tasks::TaskRow;

#[derive(Parser)]
#[command(
    name = "quizd",
    about = "quizd — background quiz question generation daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "QUIZD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "QUIZD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "QUIZD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon in the foreground (default when no subcommand given).
    ///
    /// Sweeps tasks orphaned by a previous crash, resumes queued work, then
    /// waits for Ctrl-C.
    ///
    /// Examples:
    ///   quizd serve
    ///   quizd
    Serve,
    /// Generate quiz questions and wait for the task to finish.
    ///
    /// Submits a generation task and polls it, printing progress until the
    /// terminal state. When validation chaining is enabled the follow-up
    /// validation task is awaited too.
    ///
    /// Examples:
    ///   quizd generate --amount 10 --category Historia --age-group adults
    ///   quizd generate --amount 5 --category Sport --age-group children --provider random
    Generate {
        /// Number of questions to generate
        #[arg(long, default_value_t = 5)]
        amount: usize,
        /// Question category, e.g. "Historia"
        #[arg(long)]
        category: String,
        /// Age group: children, youth, adults or seniors
        #[arg(long)]
        age_group: String,
        /// Difficulty: easy, medium or hard
        #[arg(long, default_value = "medium")]
        difficulty: String,
        /// Target audience scope for rules and prompts
        #[arg(long, default_value = "swedish")]
        target_audience: String,
        /// Preferred provider name, or "random"
        #[arg(long)]
        provider: Option<String>,
        /// Submit without waiting for completion
        #[arg(long)]
        no_wait: bool,
    },
    /// Validate already-persisted questions by id.
    ///
    /// Examples:
    ///   quizd validate --target-audience swedish 01J... 01K...
    Validate {
        /// Question ids to validate
        #[arg(required = true)]
        ids: Vec<String>,
        /// Target audience scope for rules
        #[arg(long, default_value = "swedish")]
        target_audience: String,
        /// Provider names excluded from the validation pool
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Inspect and manage background tasks.
    ///
    /// Examples:
    ///   quizd tasks list
    ///   quizd tasks list --status failed
    ///   quizd tasks show 01J...
    ///   quizd tasks stop 01J...
    Tasks {
        #[command(subcommand)]
        action: TasksAction,
    },
    /// Show provider configuration and reachability.
    ///
    /// Examples:
    ///   quizd providers
    Providers,
}

#[derive(Subcommand)]
enum TasksAction {
    /// List recent tasks, newest first
    List {
        /// Filter by status: queued, processing, completed or failed
        #[arg(long)]
        status: Option<String>,
        /// Maximum number of rows
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Print one task row as JSON
    Show { id: String },
    /// Abort a queued or running task
    Stop {
        id: String,
        /// Reason recorded on the failed row
        #[arg(long, default_value = "stoppad av operatör")]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(Config::load(args.data_dir, args.log));
    let _file_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    let ctx = quizd::bootstrap(config.clone()).await?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(ctx).await,
        Command::Generate {
            amount,
            category,
            age_group,
            difficulty,
            target_audience,
            provider,
            no_wait,
        } => {
            let criteria = GenerationCriteria {
                amount,
                category,
                age_group,
                difficulty,
                target_audience,
                provider,
            };
            let task = pipeline::submit_generation(ctx.clone(), criteria).await?;
            println!("task {} queued", task.id);
            if no_wait {
                return Ok(());
            }
            let row = wait_for(&ctx, &task.id).await?;
            print_terminal(&row);
            // Completed generations may chain a validation task; follow it.
            if let Some(vtask_id) = chained_validation_id(&row) {
                println!("awaiting chained validation task {vtask_id}");
                let vrow = wait_for(&ctx, &vtask_id).await?;
                print_terminal(&vrow);
            }
            Ok(())
        }
        Command::Validate {
            ids,
            target_audience,
            exclude,
        } => {
            let payload = ValidationPayload {
                question_ids: ids.clone(),
                generator_providers: exclude,
                criteria: GenerationCriteria {
                    amount: ids.len(),
                    category: String::new(),
                    age_group: String::new(),
                    difficulty: "medium".to_string(),
                    target_audience,
                    provider: None,
                },
            };
            let task = pipeline::submit_validation(ctx.clone(), payload).await?;
            println!("task {} queued", task.id);
            let row = wait_for(&ctx, &task.id).await?;
            print_terminal(&row);
            Ok(())
        }
        Command::Tasks { action } => match action {
            TasksAction::List { status, limit } => {
                let rows = ctx.tasks.list(status.as_deref(), limit).await?;
                for row in rows {
                    let phase = row
                        .parsed_progress()
                        .map(|p| format!("{} {}/{}", p.phase, p.completed, p.total))
                        .unwrap_or_default();
                    println!("{}  {:<10}  {:<10}  {}", row.id, row.kind, row.status, phase);
                }
                Ok(())
            }
            TasksAction::Show { id } => {
                let row = ctx
                    .tasks
                    .get(&id)
                    .await?
                    .with_context(|| format!("no task with id {id}"))?;
                println!("{}", serde_json::to_string_pretty(&row)?);
                Ok(())
            }
            TasksAction::Stop { id, reason } => {
                if pipeline::stop_task(&ctx, &id, &reason).await? {
                    println!("task {id} stopped");
                } else {
                    println!("task {id} is already finished");
                }
                Ok(())
            }
        },
        Command::Providers => providers_status(&ctx).await,
    }
}

/// Foreground daemon loop: crash recovery, queued-task resumption, Ctrl-C.
async fn serve(ctx: Arc<TaskContext>) -> Result<()> {
    let swept = watchdog::sweep_stale_tasks(&ctx.tasks, &ctx.config.watchdog).await?;
    if swept > 0 {
        warn!(swept, "failed tasks orphaned by a previous run");
    }

    let queued = ctx.tasks.list(Some("queued"), i64::MAX).await?;
    for task in queued {
        info!(task_id = %task.id, kind = %task.kind, "resuming queued task");
        resume(ctx.clone(), task);
    }

    let configured = ctx.cycler.configured().len();
    if configured == 0 {
        warn!("no providers configured — set an API key to enable generation");
    }
    info!(
        data_dir = %ctx.config.data_dir.display(),
        providers = configured,
        "quizd running — press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

fn resume(ctx: Arc<TaskContext>, task: TaskRow) {
    match task.kind.as_str() {
        "generation" => pipeline::spawn_generation(ctx, task),
        "validation" => pipeline::spawn_validation(ctx, task),
        other => {
            warn!(task_id = %task.id, kind = %other, "unknown task kind — leaving queued");
        }
    }
}

/// Poll a task row until it reaches a terminal status, echoing phase changes.
async fn wait_for(ctx: &TaskContext, task_id: &str) -> Result<TaskRow> {
    let mut last_phase = String::new();
    loop {
        let row = ctx
            .tasks
            .get(task_id)
            .await?
            .with_context(|| format!("task {task_id} disappeared"))?;
        if let Some(progress) = row.parsed_progress() {
            let line = format!("{} {}/{}", progress.phase, progress.completed, progress.total);
            if line != last_phase {
                println!("  {line}");
                last_phase = line;
            }
        }
        if TaskStatus::is_terminal(&row.status) {
            return Ok(row);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

fn print_terminal(row: &TaskRow) {
    match row.status.as_str() {
        "completed" => {
            println!("task {} completed", row.id);
            if let Some(result) = &row.result {
                match serde_json::from_str::<serde_json::Value>(result) {
                    Ok(v) => println!("{}", serde_json::to_string_pretty(&v).unwrap_or_default()),
                    Err(_) => println!("{result}"),
                }
            }
        }
        _ => {
            println!(
                "task {} failed: {}",
                row.id,
                row.error.as_deref().unwrap_or("okänt fel")
            );
        }
    }
}

fn chained_validation_id(row: &TaskRow) -> Option<String> {
    let result = row.result.as_deref()?;
    let value: serde_json::Value = serde_json::from_str(result).ok()?;
    value
        .get("validation_task_id")?
        .as_str()
        .map(|s| s.to_string())
}

async fn providers_status(ctx: &TaskContext) -> Result<()> {
    let configured = ctx.cycler.configured();
    if configured.is_empty() {
        bail!("no providers configured");
    }
    for provider in configured {
        let reachable = match provider.availability() {
            Some(check) => match check.check_availability().await {
                Ok(true) => "reachable",
                Ok(false) => "unreachable",
                Err(_) => "error",
            },
            None => "unknown",
        };
        println!(
            "{:<12} {:<28} validation={:<5} {}",
            provider.name(),
            provider.model_name(),
            provider.supports_validation(),
            reachable
        );
    }
    Ok(())
}

fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("quizd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
