use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::checkpoint::{Checkpoint, CheckpointRow, ContextSnapshot};
use crate::models::subject::SubjectId;

/// Attempts per multi-row transaction before a version race surfaces as
/// `Conflict` or a busy store as `TransientStore`.
pub(crate) const MAX_TX_ATTEMPTS: u32 = 3;

/// Allocates the next version number for the pair inside an open transaction.
///
/// The sequence row is a high-water mark: it only ever increases, so deleted
/// checkpoints never free their version numbers for reuse.
pub(crate) async fn next_version(
    tx: &mut Transaction<'_, Sqlite>,
    subject_key: &str,
    conversation_id: &str,
) -> Result<i64, AppError> {
    sqlx::query(
        r#"
        INSERT INTO checkpoint_sequences (subject_id, conversation_id, last_version)
        VALUES ($1, $2, 1)
        ON CONFLICT(subject_id, conversation_id) DO UPDATE SET
            last_version = last_version + 1
        "#,
    )
    .bind(subject_key)
    .bind(conversation_id)
    .execute(&mut **tx)
    .await?;

    let version: i64 = sqlx::query_scalar(
        "SELECT last_version FROM checkpoint_sequences
         WHERE subject_id = $1 AND conversation_id = $2",
    )
    .bind(subject_key)
    .bind(conversation_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(version)
}

/// Creates a checkpoint as the conversation's sole active version.
///
/// Version allocation, deactivation of every sibling, and the insert are one
/// atomic unit; concurrent creates on the same conversation serialize on the
/// store and are retried on busy/unique races.
pub async fn create(
    pool: &SqlitePool,
    subject_id: &SubjectId,
    conversation_id: &str,
    title: &str,
    description: &str,
    content: &str,
    context_snapshot: &ContextSnapshot,
) -> Result<Checkpoint, AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("checkpoint title must not be empty".into()));
    }
    let snapshot_json = serde_json::to_string(context_snapshot)
        .map_err(|e| AppError::Internal(anyhow!("failed to serialize snapshot: {e}")))?;

    let mut attempt = 0;
    loop {
        match try_create(
            pool,
            subject_id,
            conversation_id,
            title,
            description,
            content,
            context_snapshot,
            &snapshot_json,
        )
        .await
        {
            Ok(checkpoint) => return Ok(checkpoint),
            Err(e) => {
                attempt += 1;
                let retryable = e.is_transient() || e.is_unique_violation();
                if !retryable || attempt >= MAX_TX_ATTEMPTS {
                    if e.is_unique_violation() {
                        return Err(AppError::Conflict(
                            "checkpoint version collision persisted across retries".into(),
                        ));
                    }
                    return Err(e);
                }
                warn!("Checkpoint create attempt {attempt} failed, retrying: {e}");
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn try_create(
    pool: &SqlitePool,
    subject_id: &SubjectId,
    conversation_id: &str,
    title: &str,
    description: &str,
    content: &str,
    context_snapshot: &ContextSnapshot,
    snapshot_json: &str,
) -> Result<Checkpoint, AppError> {
    let subject_key = subject_id.to_string();
    let mut tx = pool.begin().await?;

    let version = next_version(&mut tx, &subject_key, conversation_id).await?;

    sqlx::query(
        "UPDATE checkpoints SET is_active = 0
         WHERE conversation_id = $1 AND subject_id = $2 AND archived = 0",
    )
    .bind(conversation_id)
    .bind(&subject_key)
    .execute(&mut *tx)
    .await?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO checkpoints
            (id, conversation_id, subject_id, version_number, title, description,
             content, context_snapshot, is_active, archived, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, 0, $9)
        "#,
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(&subject_key)
    .bind(version)
    .bind(title)
    .bind(description)
    .bind(content)
    .bind(snapshot_json)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Created checkpoint v{version} '{title}' for conversation {conversation_id}");

    Ok(Checkpoint {
        id,
        conversation_id: conversation_id.to_string(),
        subject_id: subject_id.clone(),
        version_number: version,
        title: title.to_string(),
        description: description.to_string(),
        content: content.to_string(),
        context_snapshot: context_snapshot.clone(),
        is_active: true,
        created_at: now,
    })
}

/// All live checkpoints for the pair, most recent version first.
pub async fn list(
    pool: &SqlitePool,
    subject_id: &SubjectId,
    conversation_id: &str,
) -> Result<Vec<Checkpoint>, AppError> {
    let rows: Vec<CheckpointRow> = sqlx::query_as(
        r#"
        SELECT * FROM checkpoints
        WHERE subject_id = $1 AND conversation_id = $2 AND archived = 0
        ORDER BY version_number DESC
        "#,
    )
    .bind(subject_id.to_string())
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
}

/// Ownership-scoped lookup. A checkpoint owned by a different subject reads
/// as `NotFound`, never `Forbidden`.
pub async fn get(
    pool: &SqlitePool,
    checkpoint_id: &str,
    subject_id: &SubjectId,
) -> Result<Checkpoint, AppError> {
    let row: Option<CheckpointRow> = sqlx::query_as(
        "SELECT * FROM checkpoints WHERE id = $1 AND subject_id = $2 AND archived = 0",
    )
    .bind(checkpoint_id)
    .bind(subject_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::NotFound(format!("checkpoint {checkpoint_id} not found")))?
        .into_checkpoint()
}

/// Deletes a checkpoint.
///
/// Bare deletion of the active checkpoint fails closed with `Conflict`: a
/// conversation with checkpoints must keep exactly one active. Passing
/// `replacement_id` deletes the target and activates the replacement in the
/// same transaction.
pub async fn delete(
    pool: &SqlitePool,
    checkpoint_id: &str,
    subject_id: &SubjectId,
    replacement_id: Option<&str>,
) -> Result<(), AppError> {
    let subject_key = subject_id.to_string();
    let mut tx = pool.begin().await?;

    let target: Option<CheckpointRow> = sqlx::query_as(
        "SELECT * FROM checkpoints WHERE id = $1 AND subject_id = $2 AND archived = 0",
    )
    .bind(checkpoint_id)
    .bind(&subject_key)
    .fetch_optional(&mut *tx)
    .await?;
    let target =
        target.ok_or_else(|| AppError::NotFound(format!("checkpoint {checkpoint_id} not found")))?;

    if !target.is_active {
        sqlx::query("DELETE FROM checkpoints WHERE id = $1")
            .bind(checkpoint_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!("Deleted checkpoint v{} of conversation {}", target.version_number, target.conversation_id);
        return Ok(());
    }

    let Some(replacement_id) = replacement_id else {
        return Err(AppError::Conflict(
            "cannot delete the active checkpoint without designating a replacement".into(),
        ));
    };
    if replacement_id == checkpoint_id {
        return Err(AppError::Conflict(
            "replacement checkpoint must differ from the one being deleted".into(),
        ));
    }

    let replacement: Option<CheckpointRow> = sqlx::query_as(
        "SELECT * FROM checkpoints WHERE id = $1 AND subject_id = $2 AND archived = 0",
    )
    .bind(replacement_id)
    .bind(&subject_key)
    .fetch_optional(&mut *tx)
    .await?;
    let replacement = replacement
        .ok_or_else(|| AppError::NotFound(format!("checkpoint {replacement_id} not found")))?;
    if replacement.conversation_id != target.conversation_id {
        // Cross-conversation replacement reads as a forged reference.
        return Err(AppError::NotFound(format!("checkpoint {replacement_id} not found")));
    }

    sqlx::query("DELETE FROM checkpoints WHERE id = $1")
        .bind(checkpoint_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "UPDATE checkpoints SET is_active = 0
         WHERE conversation_id = $1 AND subject_id = $2 AND archived = 0",
    )
    .bind(&target.conversation_id)
    .bind(&subject_key)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE checkpoints SET is_active = 1 WHERE id = $1")
        .bind(replacement_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(
        "Deleted active checkpoint v{} of conversation {}; activated v{}",
        target.version_number, target.conversation_id, replacement.version_number
    );
    Ok(())
}
