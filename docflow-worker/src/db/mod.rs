//! SQLite database access
//!
//! One database file holds both the task queue (`tasks`) and the analysis
//! records (`analyses`, `analysis_tags`).

use std::path::Path;
use std::time::Duration;

use docflow_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

/// Per-connection busy timeout before SQLite reports "database is locked"
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Initialize the database connection pool and create tables
///
/// # Arguments
/// * `db_path` - SQLite file, created (with parent directories) if missing
/// * `max_connections` - Pool size; should cover the worker concurrency
pub async fn init_database_pool(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    tracing::debug!(
        path = %db_path.display(),
        max_connections,
        "Connecting to database"
    );

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
                .busy_timeout(BUSY_TIMEOUT)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
        )
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the task queue and analysis tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            task_type TEXT NOT NULL,
            queue TEXT NOT NULL,
            payload TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            retried INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL,
            timeout_secs INTEGER NOT NULL,
            retention_secs INTEGER NOT NULL,
            last_error TEXT,
            process_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            finished_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tasks_ready ON tasks(queue, state, process_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            statistics TEXT NOT NULL,
            sentiment TEXT,
            readability TEXT,
            quality_score REAL,
            quality TEXT,
            cleaned_text TEXT,
            synopsis TEXT,
            editorial TEXT,
            ai_detection TEXT,
            images TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_tags (
            analysis_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            tag TEXT NOT NULL,
            PRIMARY KEY (analysis_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (tasks, analyses, analysis_tags)");

    Ok(())
}
