#![allow(dead_code)]

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::errors::AppError;
use crate::models::subject::SubjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation. Role and timestamp are mandatory at the type
/// level; content emptiness is checked by `validate_messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Rejects message sequences the engine refuses to persist.
pub fn validate_messages(messages: &[Message]) -> Result<(), AppError> {
    for (i, message) in messages.iter().enumerate() {
        if message.content.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "message {i} ({}) has empty content",
                message.role.as_str()
            )));
        }
    }
    Ok(())
}

/// Row in `conversation_contexts`. The message history is a JSON text column;
/// `into_context` parses it into the typed form.
#[derive(Debug, Clone, FromRow)]
pub struct ContextRow {
    pub subject_id: String,
    pub conversation_id: String,
    pub messages: String,
    pub draft_content: String,
    pub message_count: i64,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

/// The "current" working state of one conversation owned by one subject.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    pub subject_id: SubjectId,
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub draft_content: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ContextRow {
    pub fn parse_messages(&self) -> Result<Vec<Message>, AppError> {
        serde_json::from_str(&self.messages)
            .map_err(|e| AppError::Internal(anyhow!("corrupt messages column: {e}")))
    }

    pub fn into_context(self) -> Result<ConversationContext, AppError> {
        let messages = self.parse_messages()?;
        let subject_id: SubjectId = self.subject_id.parse()?;
        Ok(ConversationContext {
            subject_id,
            conversation_id: self.conversation_id,
            messages,
            draft_content: self.draft_content,
            message_count: self.message_count,
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_validate_accepts_well_formed_messages() {
        let messages = vec![
            msg(MessageRole::User, "Write me a tagline"),
            msg(MessageRole::Assistant, "Here are three options."),
        ];
        assert!(validate_messages(&messages).is_ok());
    }

    #[test]
    fn test_validate_accepts_empty_sequence() {
        assert!(validate_messages(&[]).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_content() {
        let messages = vec![msg(MessageRole::User, "   ")];
        let err = validate_messages(&messages).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
