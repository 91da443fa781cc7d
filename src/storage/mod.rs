//! SQLite storage: pool setup and schema migrations.

use anyhow::{Context as _, Result};
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Open (creating if missing) the database at `data_dir/quizd.db` in WAL mode
/// and run migrations.
pub async fn open(data_dir: &Path) -> Result<SqlitePool> {
    tokio::fs::create_dir_all(data_dir).await?;
    let db_path = data_dir.join("quizd.db");
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(opts).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema, for tests.
pub async fn open_memory() -> Result<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("src/storage/migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;

    // Idempotent column additions (ALTER TABLE IF NOT EXISTS is not
    // supported in SQLite, so we attempt the ALTER and ignore the
    // "duplicate column name" error).
    let alter_stmts = [
        "ALTER TABLE questions ADD COLUMN quarantined INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE questions ADD COLUMN validation_result TEXT",
    ];
    for stmt in alter_stmts {
        let result = sqlx::query(stmt).execute(pool).await;
        if let Err(e) = result {
            let msg = e.to_string();
            if !msg.contains("duplicate column") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}
