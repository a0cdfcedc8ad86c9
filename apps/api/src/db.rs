use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Creates and returns a SQLite connection pool.
///
/// WAL keeps readers unblocked while a writer holds the database; the busy
/// timeout bounds how long a writer queues behind another before the engine's
/// own retry loops take over.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Connecting to SQLite...");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    info!("SQLite connection pool established");
    Ok(pool)
}

/// Bootstraps the schema. Idempotent; runs at startup before the first request.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    // One mutable record per (subject, conversation). History lives in
    // checkpoints, not here.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_contexts (
            subject_id      TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            messages        TEXT NOT NULL,
            draft_content   TEXT NOT NULL,
            message_count   INTEGER NOT NULL,
            archived        BOOLEAN NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            last_updated_at TEXT NOT NULL,
            PRIMARY KEY (subject_id, conversation_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Immutable named snapshots. is_active is the only mutable field; the
    // unique version constraint is the backstop behind the sequence table.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL,
            subject_id       TEXT NOT NULL,
            version_number   INTEGER NOT NULL,
            title            TEXT NOT NULL,
            description      TEXT NOT NULL,
            content          TEXT NOT NULL,
            context_snapshot TEXT NOT NULL,
            is_active        BOOLEAN NOT NULL DEFAULT 0,
            archived         BOOLEAN NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL,
            UNIQUE (conversation_id, subject_id, version_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_checkpoints_conversation
         ON checkpoints(subject_id, conversation_id)",
    )
    .execute(pool)
    .await?;

    // Per-conversation version high-water mark. Never decremented, so version
    // numbers are not reused even after checkpoint deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoint_sequences (
            subject_id      TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            last_version    INTEGER NOT NULL,
            PRIMARY KEY (subject_id, conversation_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Content-addressed generation cache; global, not conversation-scoped.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prompt_cache (
            key         TEXT PRIMARY KEY,
            content     TEXT NOT NULL,
            hit_count   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            last_hit_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // Single connection so the in-memory database is shared for the whole test.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    init_schema(&pool).await.expect("schema bootstrap");
    pool
}
