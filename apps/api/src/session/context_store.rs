use anyhow::anyhow;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::errors::AppError;
use crate::models::conversation::{validate_messages, ContextRow, ConversationContext, Message};
use crate::models::subject::SubjectId;

/// Upserts the working state for one (subject, conversation) pair.
///
/// First-time creation and update are the same operation; the pair is the
/// identity. `message_count` is recomputed here so it can never drift from
/// the stored history. Saving onto an archived record revives it; a save is
/// by definition live working state.
pub async fn save(
    pool: &SqlitePool,
    subject_id: &SubjectId,
    conversation_id: &str,
    messages: &[Message],
    draft_content: &str,
) -> Result<ConversationContext, AppError> {
    if conversation_id.trim().is_empty() {
        return Err(AppError::Validation("conversation_id must not be empty".into()));
    }
    validate_messages(messages)?;

    let messages_json = serde_json::to_string(messages)
        .map_err(|e| AppError::Internal(anyhow!("failed to serialize messages: {e}")))?;
    let message_count = messages.len() as i64;
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
    .bind(subject_id.to_string())
    .bind(conversation_id)
    .bind(&messages_json)
    .bind(draft_content)
    .bind(message_count)
    .bind(now)
    .execute(pool)
    .await?;

    debug!("Saved context for conversation {conversation_id} ({message_count} messages)");

    load(pool, subject_id, conversation_id).await
}

/// Pure read. A missing record is `NotFound`; callers that treat the pair as
/// an empty conversation map this themselves.
pub async fn load(
    pool: &SqlitePool,
    subject_id: &SubjectId,
    conversation_id: &str,
) -> Result<ConversationContext, AppError> {
    let row: Option<ContextRow> = sqlx::query_as(
        r#"
        SELECT * FROM conversation_contexts
        WHERE subject_id = $1 AND conversation_id = $2 AND archived = 0
        "#,
    )
    .bind(subject_id.to_string())
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| {
        AppError::NotFound(format!("no context for conversation {conversation_id}"))
    })?
    .into_context()
}
