use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::models::checkpoint::CheckpointRow;
use crate::models::subject::SubjectId;
use crate::session::checkpoint_store::MAX_TX_ATTEMPTS;

/// What the caller gets back after a restore: the snapshot body and which
/// version is now current.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub content: String,
    pub version_number: i64,
}

/// Makes one checkpoint the conversation's current version and overwrites the
/// working context from its snapshot.
///
/// The flag flip and the context overwrite are one transaction: there is no
/// window where a checkpoint is active but the context still holds newer
/// edits. The overwrite is a replace, not a merge; edits made since the
/// checkpoint was taken are discarded.
pub async fn restore(
    pool: &SqlitePool,
    checkpoint_id: &str,
    subject_id: &SubjectId,
    conversation_id: &str,
) -> Result<RestoreOutcome, AppError> {
    let mut attempt = 0;
    loop {
        match try_restore(pool, checkpoint_id, subject_id, conversation_id).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                attempt += 1;
                if !e.is_transient() || attempt >= MAX_TX_ATTEMPTS {
                    return Err(e);
                }
                warn!("Restore attempt {attempt} failed, retrying: {e}");
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
            }
        }
    }
}

async fn try_restore(
    pool: &SqlitePool,
    checkpoint_id: &str,
    subject_id: &SubjectId,
    conversation_id: &str,
) -> Result<RestoreOutcome, AppError> {
    let subject_key = subject_id.to_string();
    let mut tx = pool.begin().await?;

    let row: Option<CheckpointRow> = sqlx::query_as(
        "SELECT * FROM checkpoints WHERE id = $1 AND subject_id = $2 AND archived = 0",
    )
    .bind(checkpoint_id)
    .bind(&subject_key)
    .fetch_optional(&mut *tx)
    .await?;
    let row =
        row.ok_or_else(|| AppError::NotFound(format!("checkpoint {checkpoint_id} not found")))?;

    if row.conversation_id != conversation_id {
        // A checkpoint id pointing at a different conversation is treated as a
        // forged reference, not a distinct error class.
        return Err(AppError::NotFound(format!("checkpoint {checkpoint_id} not found")));
    }

    let snapshot = row.parse_snapshot()?;

    sqlx::query(
        "UPDATE checkpoints SET is_active = 0
         WHERE conversation_id = $1 AND subject_id = $2 AND id != $3 AND archived = 0",
    )
    .bind(conversation_id)
    .bind(&subject_key)
    .bind(checkpoint_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE checkpoints SET is_active = 1 WHERE id = $1")
        .bind(checkpoint_id)
        .execute(&mut *tx)
        .await?;

    // Overwrite the working context verbatim from the snapshot.
    let messages_json = serde_json::to_string(&snapshot.messages)
        .map_err(|e| AppError::Internal(anyhow!("failed to serialize snapshot messages: {e}")))?;
    let message_count = snapshot.messages.len() as i64;
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO conversation_contexts
            (subject_id, conversation_id, messages, draft_content, message_count,
             archived, created_at, last_updated_at)
        VALUES ($1, $2, $3, $4, $5, 0, $6, $6)
        ON CONFLICT(subject_id, conversation_id) DO UPDATE SET
            messages = excluded.messages,
            draft_content = excluded.draft_content,
            message_count = excluded.message_count,
            archived = 0,
            last_updated_at = excluded.last_updated_at
        "#,
    )
    .bind(&subject_key)
    .bind(conversation_id)
    .bind(&messages_json)
    .bind(&snapshot.draft_content)
    .bind(message_count)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "Restored checkpoint v{} for conversation {conversation_id}",
        row.version_number
    );

    Ok(RestoreOutcome {
        content: row.content,
        version_number: row.version_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::checkpoint::ContextSnapshot;
    use crate::models::conversation::{Message, MessageRole};
    use crate::session::{checkpoint_store, context_store};

    fn guest() -> SubjectId {
        SubjectId::Guest("g-1".to_string())
    }

    fn msg(content: &str) -> Message {
        Message {
            role: MessageRole::User,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    async fn checkpoint_current(
        pool: &SqlitePool,
        subject: &SubjectId,
        conversation_id: &str,
        title: &str,
    ) -> crate::models::checkpoint::Checkpoint {
        let ctx = context_store::load(pool, subject, conversation_id).await.unwrap();
        let snapshot = ContextSnapshot {
            messages: ctx.messages.clone(),
            draft_content: ctx.draft_content.clone(),
        };
        checkpoint_store::create(
            pool,
            subject,
            conversation_id,
            title,
            "",
            &ctx.draft_content,
            &snapshot,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_restore_round_trip() {
        let pool = test_pool().await;
        let messages = vec![msg("write a slogan"), msg("shorter please")];
        context_store::save(&pool, &guest(), "conv-1", &messages, "Original draft")
            .await
            .unwrap();
        let cp = checkpoint_current(&pool, &guest(), "conv-1", "v1").await;

        let outcome = restore(&pool, &cp.id, &guest(), "conv-1").await.unwrap();
        assert_eq!(outcome.version_number, 1);
        assert_eq!(outcome.content, "Original draft");

        let restored = context_store::load(&pool, &guest(), "conv-1").await.unwrap();
        assert_eq!(restored.messages, cp.context_snapshot.messages);
        assert_eq!(restored.draft_content, cp.context_snapshot.draft_content);
        assert_eq!(restored.message_count, 2);
    }

    #[tokio::test]
    async fn test_scenario_edit_then_restore_discards_edits() {
        let pool = test_pool().await;
        let short_draft = "x".repeat(289);
        let long_draft = "y".repeat(523);

        context_store::save(&pool, &guest(), "conv-1", &[msg("a"), msg("b")], &short_draft)
            .await
            .unwrap();
        let v1 = checkpoint_current(&pool, &guest(), "conv-1", "v1").await;

        context_store::save(&pool, &guest(), "conv-1", &[msg("a"), msg("b"), msg("c")], &long_draft)
            .await
            .unwrap();
        let v2 = checkpoint_current(&pool, &guest(), "conv-1", "v2").await;
        assert_eq!(v2.version_number, 2);

        let outcome = restore(&pool, &v1.id, &guest(), "conv-1").await.unwrap();
        assert_eq!(outcome.content.len(), 289);

        let ctx = context_store::load(&pool, &guest(), "conv-1").await.unwrap();
        assert_eq!(ctx.draft_content.len(), 289);
        assert_eq!(ctx.messages.len(), 2);

        // The flip is part of the same transition.
        assert!(checkpoint_store::get(&pool, &v1.id, &guest()).await.unwrap().is_active);
        assert!(!checkpoint_store::get(&pool, &v2.id, &guest()).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_exactly_one_active_across_create_restore_sequence() {
        let pool = test_pool().await;
        context_store::save(&pool, &guest(), "conv-1", &[msg("a")], "d1").await.unwrap();
        let v1 = checkpoint_current(&pool, &guest(), "conv-1", "v1").await;
        context_store::save(&pool, &guest(), "conv-1", &[msg("a"), msg("b")], "d2")
            .await
            .unwrap();
        let _v2 = checkpoint_current(&pool, &guest(), "conv-1", "v2").await;
        restore(&pool, &v1.id, &guest(), "conv-1").await.unwrap();
        let _v3 = checkpoint_current(&pool, &guest(), "conv-1", "v3").await;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM checkpoints
             WHERE subject_id = $1 AND conversation_id = $2 AND is_active = 1",
        )
        .bind(guest().to_string())
        .bind("conv-1")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_restore_unknown_checkpoint_has_no_side_effects() {
        let pool = test_pool().await;
        context_store::save(&pool, &guest(), "conv-1", &[msg("a")], "untouched")
            .await
            .unwrap();

        let err = restore(&pool, "no-such-id", &guest(), "conv-1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let ctx = context_store::load(&pool, &guest(), "conv-1").await.unwrap();
        assert_eq!(ctx.draft_content, "untouched");
    }

    #[tokio::test]
    async fn test_restore_conversation_mismatch_is_not_found() {
        let pool = test_pool().await;
        context_store::save(&pool, &guest(), "conv-1", &[msg("a")], "d1").await.unwrap();
        let cp = checkpoint_current(&pool, &guest(), "conv-1", "v1").await;

        context_store::save(&pool, &guest(), "conv-2", &[msg("z")], "other").await.unwrap();

        let err = restore(&pool, &cp.id, &guest(), "conv-2").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // Clean abort: conv-2's context is untouched, cp is still active for conv-1.
        let ctx = context_store::load(&pool, &guest(), "conv-2").await.unwrap();
        assert_eq!(ctx.draft_content, "other");
        assert!(checkpoint_store::get(&pool, &cp.id, &guest()).await.unwrap().is_active);
    }

    #[tokio::test]
    async fn test_restore_is_ownership_scoped() {
        let pool = test_pool().await;
        context_store::save(&pool, &guest(), "conv-1", &[msg("a")], "d1").await.unwrap();
        let cp = checkpoint_current(&pool, &guest(), "conv-1", "v1").await;

        let stranger = SubjectId::User("u-2".to_string());
        let err = restore(&pool, &cp.id, &stranger, "conv-1").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
