use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::checkpoint::{Checkpoint, ContextSnapshot};
use crate::models::conversation::{ConversationContext, Message};
use crate::models::subject::SubjectId;
use crate::session::migration::{self, MigrationReport};
use crate::session::restore::{self, RestoreOutcome};
use crate::session::{checkpoint_store, context_store};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SessionScopeQuery {
    pub subject_id: String,
    pub conversation_id: String,
}

#[derive(Deserialize)]
pub struct SaveContextRequest {
    pub subject_id: String,
    pub conversation_id: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub draft_content: String,
}

/// POST /api/v1/session/context
pub async fn handle_save_context(
    State(state): State<AppState>,
    Json(req): Json<SaveContextRequest>,
) -> Result<Json<ConversationContext>, AppError> {
    let subject: SubjectId = req.subject_id.parse()?;
    let context = context_store::save(
        &state.db,
        &subject,
        &req.conversation_id,
        &req.messages,
        &req.draft_content,
    )
    .await?;
    Ok(Json(context))
}

/// GET /api/v1/session/context
pub async fn handle_load_context(
    State(state): State<AppState>,
    Query(params): Query<SessionScopeQuery>,
) -> Result<Json<ConversationContext>, AppError> {
    let subject: SubjectId = params.subject_id.parse()?;
    let context = context_store::load(&state.db, &subject, &params.conversation_id).await?;
    Ok(Json(context))
}

#[derive(Deserialize)]
pub struct CreateCheckpointRequest {
    pub subject_id: String,
    pub conversation_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// POST /api/v1/session/checkpoints
///
/// Snapshots the conversation's current context server-side; a conversation
/// that was never saved has nothing to snapshot and reads as NotFound.
pub async fn handle_create_checkpoint(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckpointRequest>,
) -> Result<Json<Checkpoint>, AppError> {
    let subject: SubjectId = req.subject_id.parse()?;
    let context = context_store::load(&state.db, &subject, &req.conversation_id).await?;
    let snapshot = ContextSnapshot {
        messages: context.messages,
        draft_content: context.draft_content.clone(),
    };
    let checkpoint = checkpoint_store::create(
        &state.db,
        &subject,
        &req.conversation_id,
        &req.title,
        &req.description,
        &context.draft_content,
        &snapshot,
    )
    .await?;
    Ok(Json(checkpoint))
}

/// GET /api/v1/session/checkpoints
pub async fn handle_list_checkpoints(
    State(state): State<AppState>,
    Query(params): Query<SessionScopeQuery>,
) -> Result<Json<Vec<Checkpoint>>, AppError> {
    let subject: SubjectId = params.subject_id.parse()?;
    let checkpoints = checkpoint_store::list(&state.db, &subject, &params.conversation_id).await?;
    Ok(Json(checkpoints))
}

#[derive(Deserialize)]
pub struct SubjectQuery {
    pub subject_id: String,
}

/// GET /api/v1/session/checkpoints/:id
pub async fn handle_get_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SubjectQuery>,
) -> Result<Json<Checkpoint>, AppError> {
    let subject: SubjectId = params.subject_id.parse()?;
    let checkpoint = checkpoint_store::get(&state.db, &id, &subject).await?;
    Ok(Json(checkpoint))
}

#[derive(Deserialize)]
pub struct DeleteCheckpointQuery {
    pub subject_id: String,
    /// Required when deleting the active checkpoint: which sibling becomes
    /// active in the same transaction.
    pub replacement_id: Option<String>,
}

/// DELETE /api/v1/session/checkpoints/:id
pub async fn handle_delete_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteCheckpointQuery>,
) -> Result<StatusCode, AppError> {
    let subject: SubjectId = params.subject_id.parse()?;
    checkpoint_store::delete(&state.db, &id, &subject, params.replacement_id.as_deref()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct RestoreRequest {
    pub subject_id: String,
    pub conversation_id: String,
}

/// POST /api/v1/session/checkpoints/:id/restore
pub async fn handle_restore(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<RestoreOutcome>, AppError> {
    let subject: SubjectId = req.subject_id.parse()?;
    let outcome = restore::restore(&state.db, &id, &subject, &req.conversation_id).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct MigrateRequest {
    pub guest_subject_id: String,
    pub authenticated_subject_id: String,
}

/// POST /api/v1/session/migrate
pub async fn handle_migrate(
    State(state): State<AppState>,
    Json(req): Json<MigrateRequest>,
) -> Result<Json<MigrationReport>, AppError> {
    let guest: SubjectId = req.guest_subject_id.parse()?;
    let user: SubjectId = req.authenticated_subject_id.parse()?;
    let report = migration::migrate(
        &state.db,
        &guest,
        &user,
        state.config.migration_collision_policy,
    )
    .await?;
    Ok(Json(report))
}
