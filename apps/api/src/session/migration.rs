use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::checkpoint::CheckpointRow;
use crate::models::conversation::ContextRow;
use crate::models::subject::SubjectId;
use crate::session::checkpoint_store::{next_version, MAX_TX_ATTEMPTS};

/// What migration does when a guest conversation id collides with one the
/// authenticated user already owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Copy the guest conversation under a freshly generated id. Default;
    /// never overwrites anything the user already has.
    Rename,
    /// Append guest messages into the user's existing conversation and import
    /// guest checkpoints past the user's version high-water mark.
    Merge,
}

impl FromStr for CollisionPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rename" => Ok(CollisionPolicy::Rename),
            "merge" => Ok(CollisionPolicy::Merge),
            other => Err(AppError::Validation(format!(
                "unknown collision policy '{other}': expected 'rename' or 'merge'"
            ))),
        }
    }
}

/// Caller-visible summary of one migration call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub conversations_migrated: i64,
    pub messages_migrated: i64,
}

/// Re-owns everything a guest has under an authenticated user.
///
/// The whole guest migrates in one transaction: every conversation copies and
/// every source row archives, or nothing does. A second call finds only
/// archived rows and returns `{0, 0}`, including a call racing the first,
/// which loses the write lock, retries, and then sees the archived state.
pub async fn migrate(
    pool: &SqlitePool,
    guest: &SubjectId,
    user: &SubjectId,
    policy: CollisionPolicy,
) -> Result<MigrationReport, AppError> {
    let SubjectId::Guest(_) = guest else {
        return Err(AppError::Validation("migration source must be a guest subject".into()));
    };
    let SubjectId::User(_) = user else {
        return Err(AppError::Validation(
            "migration target must be an authenticated user subject".into(),
        ));
    };

    let mut attempt = 0;
    loop {
        match try_migrate(pool, guest, user, policy).await {
            Ok(report) => return Ok(report),
            Err(e) => {
                attempt += 1;
                let retryable = e.is_transient() || e.is_unique_violation();
                if !retryable || attempt >= MAX_TX_ATTEMPTS {
                    return Err(e);
                }
                warn!("Migration attempt {attempt} failed, retrying: {e}");
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
        }
    }
}

async fn try_migrate(
    pool: &SqlitePool,
    guest: &SubjectId,
    user: &SubjectId,
    policy: CollisionPolicy,
) -> Result<MigrationReport, AppError> {
    let guest_key = guest.to_string();
    let user_key = user.to_string();
    let mut tx = pool.begin().await?;

    let contexts: Vec<ContextRow> =
        sqlx::query_as("SELECT * FROM conversation_contexts WHERE subject_id = $1 AND archived = 0")
            .bind(&guest_key)
            .fetch_all(&mut *tx)
            .await?;
    let checkpoints: Vec<CheckpointRow> = sqlx::query_as(
        "SELECT * FROM checkpoints WHERE subject_id = $1 AND archived = 0
         ORDER BY version_number ASC",
    )
    .bind(&guest_key)
    .fetch_all(&mut *tx)
    .await?;

    if contexts.is_empty() && checkpoints.is_empty() {
        // Nothing to migrate. A user who never used guest mode sees success.
        return Ok(MigrationReport::default());
    }

    // Conversations can exist in either store; migrate the union.
    let mut conversation_ids = BTreeSet::new();
    for row in &contexts {
        conversation_ids.insert(row.conversation_id.clone());
    }
    for row in &checkpoints {
        conversation_ids.insert(row.conversation_id.clone());
    }

    let mut report = MigrationReport::default();
    for conversation_id in &conversation_ids {
        let src_context = contexts.iter().find(|c| &c.conversation_id == conversation_id);
        let src_checkpoints: Vec<&CheckpointRow> = checkpoints
            .iter()
            .filter(|c| &c.conversation_id == conversation_id)
            .collect();

        let collision = target_owns_conversation(&mut tx, &user_key, conversation_id).await?;
        let migrated_messages = match (collision, policy) {
            (true, CollisionPolicy::Merge) => {
                merge_conversation(&mut tx, &user_key, conversation_id, src_context, &src_checkpoints)
                    .await?
            }
            (collides, _) => {
                let target_id = if collides {
                    // Rename: a fresh id avoids silently overwriting the
                    // user's existing conversation.
                    Uuid::new_v4().to_string()
                } else {
                    conversation_id.clone()
                };
                copy_conversation(&mut tx, &user_key, &target_id, src_context, &src_checkpoints)
                    .await?
            }
        };

        report.conversations_migrated += 1;
        report.messages_migrated += migrated_messages;
    }

    // Archive, never delete: sources stay for audit and make retries see an
    // already-migrated guest.
    sqlx::query("UPDATE conversation_contexts SET archived = 1 WHERE subject_id = $1 AND archived = 0")
        .bind(&guest_key)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE checkpoints SET archived = 1 WHERE subject_id = $1 AND archived = 0")
        .bind(&guest_key)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(
        "Migrated {} conversations ({} messages) from {guest_key} to {user_key}",
        report.conversations_migrated, report.messages_migrated
    );
    Ok(report)
}

async fn target_owns_conversation(
    tx: &mut Transaction<'_, Sqlite>,
    user_key: &str,
    conversation_id: &str,
) -> Result<bool, AppError> {
    let owns: i64 = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM conversation_contexts
            WHERE subject_id = $1 AND conversation_id = $2 AND archived = 0
        ) OR EXISTS(
            SELECT 1 FROM checkpoints
            WHERE subject_id = $1 AND conversation_id = $2 AND archived = 0
        )
        "#,
    )
    .bind(user_key)
    .bind(conversation_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(owns != 0)
}

/// Copies a guest conversation verbatim under the new owner. Timestamps are
/// preserved from the originals so history stays accurate; only ownership
/// (and, on rename, the conversation id) changes.
async fn copy_conversation(
    tx: &mut Transaction<'_, Sqlite>,
    user_key: &str,
    target_conversation_id: &str,
    src_context: Option<&ContextRow>,
    src_checkpoints: &[&CheckpointRow],
) -> Result<i64, AppError> {
    let mut migrated_messages = 0;
    if let Some(ctx) = src_context {
        sqlx::query(
            r#"
            INSERT INTO conversation_contexts
                (subject_id, conversation_id, messages, draft_content, message_count,
                 archived, created_at, last_updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
            "#,
        )
        .bind(user_key)
        .bind(target_conversation_id)
        .bind(&ctx.messages)
        .bind(&ctx.draft_content)
        .bind(ctx.message_count)
        .bind(ctx.created_at)
        .bind(ctx.last_updated_at)
        .execute(&mut **tx)
        .await?;
        migrated_messages = ctx.message_count;
    }

    let mut max_version = 0;
    for cp in src_checkpoints {
        insert_checkpoint_copy(tx, user_key, target_conversation_id, cp, cp.version_number, cp.is_active)
            .await?;
        max_version = max_version.max(cp.version_number);
    }
    if max_version > 0 {
        bump_sequence_to(tx, user_key, target_conversation_id, max_version).await?;
    }

    Ok(migrated_messages)
}

/// Merges a colliding guest conversation into the user's existing one.
/// Guest messages append after the user's; the user's non-empty draft wins;
/// guest checkpoints renumber past the user's high-water mark and arrive
/// deactivated unless the target conversation has no active checkpoint.
async fn merge_conversation(
    tx: &mut Transaction<'_, Sqlite>,
    user_key: &str,
    conversation_id: &str,
    src_context: Option<&ContextRow>,
    src_checkpoints: &[&CheckpointRow],
) -> Result<i64, AppError> {
    let mut migrated_messages = 0;
    if let Some(src) = src_context {
        let existing: Option<ContextRow> = sqlx::query_as(
            "SELECT * FROM conversation_contexts
             WHERE subject_id = $1 AND conversation_id = $2 AND archived = 0",
        )
        .bind(user_key)
        .bind(conversation_id)
        .fetch_optional(&mut **tx)
        .await?;

        match existing {
            Some(target) => {
                let mut merged = target.parse_messages()?;
                let guest_messages = src.parse_messages()?;
                migrated_messages = guest_messages.len() as i64;
                merged.extend(guest_messages);

                let draft = if target.draft_content.trim().is_empty() {
                    &src.draft_content
                } else {
                    &target.draft_content
                };
                let merged_json = serde_json::to_string(&merged)
                    .map_err(|e| AppError::Internal(anyhow!("failed to serialize messages: {e}")))?;

                sqlx::query(
                    r#"
                    UPDATE conversation_contexts
                    SET messages = $1, draft_content = $2, message_count = $3, last_updated_at = $4
                    WHERE subject_id = $5 AND conversation_id = $6
                    "#,
                )
                .bind(&merged_json)
                .bind(draft)
                .bind(merged.len() as i64)
                .bind(Utc::now())
                .bind(user_key)
                .bind(conversation_id)
                .execute(&mut **tx)
                .await?;
            }
            None => {
                // Collision was on checkpoints only; the context copies over.
                sqlx::query(
                    r#"
                    INSERT INTO conversation_contexts
                        (subject_id, conversation_id, messages, draft_content, message_count,
                         archived, created_at, last_updated_at)
                    VALUES ($1, $2, $3, $4, $5, 0, $6, $7)
                    "#,
                )
                .bind(user_key)
                .bind(conversation_id)
                .bind(&src.messages)
                .bind(&src.draft_content)
                .bind(src.message_count)
                .bind(src.created_at)
                .bind(src.last_updated_at)
                .execute(&mut **tx)
                .await?;
                migrated_messages = src.message_count;
            }
        }
    }

    if !src_checkpoints.is_empty() {
        let current_max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version_number), 0) FROM checkpoints
             WHERE subject_id = $1 AND conversation_id = $2",
        )
        .bind(user_key)
        .bind(conversation_id)
        .fetch_one(&mut **tx)
        .await?;
        bump_sequence_to(tx, user_key, conversation_id, current_max).await?;

        let mut has_active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM checkpoints
             WHERE subject_id = $1 AND conversation_id = $2 AND is_active = 1 AND archived = 0",
        )
        .bind(user_key)
        .bind(conversation_id)
        .fetch_one(&mut **tx)
        .await?;

        for cp in src_checkpoints {
            let version = next_version(tx, user_key, conversation_id).await?;
            let activate = cp.is_active && has_active == 0;
            if activate {
                has_active = 1;
            }
            insert_checkpoint_copy(tx, user_key, conversation_id, cp, version, activate).await?;
        }
    }

    Ok(migrated_messages)
}

async fn insert_checkpoint_copy(
    tx: &mut Transaction<'_, Sqlite>,
    user_key: &str,
    conversation_id: &str,
    src: &CheckpointRow,
    version_number: i64,
    is_active: bool,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO checkpoints
            (id, conversation_id, subject_id, version_number, title, description,
             content, context_snapshot, is_active, archived, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(conversation_id)
    .bind(user_key)
    .bind(version_number)
    .bind(&src.title)
    .bind(&src.description)
    .bind(&src.content)
    .bind(&src.context_snapshot)
    .bind(is_active)
    .bind(src.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Raises the version high-water mark to at least `version`; never lowers it.
async fn bump_sequence_to(
    tx: &mut Transaction<'_, Sqlite>,
    subject_key: &str,
    conversation_id: &str,
    version: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO checkpoint_sequences (subject_id, conversation_id, last_version)
        VALUES ($1, $2, $3)
        ON CONFLICT(subject_id, conversation_id) DO UPDATE SET
            last_version = MAX(last_version, excluded.last_version)
        "#,
    )
    .bind(subject_key)
    .bind(conversation_id)
    .bind(version)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
