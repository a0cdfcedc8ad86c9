#![allow(dead_code)]

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::AppError;
use crate::models::conversation::Message;
use crate::models::subject::SubjectId;

/// Deep, independent copy of a conversation's working state at checkpoint
/// time. Serialized to its own JSON column, so later edits to the live
/// context can never reach back into a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub messages: Vec<Message>,
    pub draft_content: String,
}

/// Row in `checkpoints`. Immutable after creation except for `is_active`
/// (flipped by restore) and `archived` (set by migration).
#[derive(Debug, Clone, FromRow)]
pub struct CheckpointRow {
    pub id: String,
    pub conversation_id: String,
    pub subject_id: String,
    pub version_number: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub context_snapshot: String,
    pub is_active: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
}

/// An immutable named snapshot of a conversation at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub id: String,
    pub conversation_id: String,
    pub subject_id: SubjectId,
    pub version_number: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    pub context_snapshot: ContextSnapshot,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl CheckpointRow {
    pub fn parse_snapshot(&self) -> Result<ContextSnapshot, AppError> {
        serde_json::from_str(&self.context_snapshot)
            .map_err(|e| AppError::Internal(anyhow!("corrupt context_snapshot column: {e}")))
    }

    pub fn into_checkpoint(self) -> Result<Checkpoint, AppError> {
        let context_snapshot = self.parse_snapshot()?;
        let subject_id: SubjectId = self.subject_id.parse()?;
        Ok(Checkpoint {
            id: self.id,
            conversation_id: self.conversation_id,
            subject_id,
            version_number: self.version_number,
            title: self.title,
            description: self.description,
            content: self.content,
            context_snapshot,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}
