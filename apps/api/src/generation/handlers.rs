use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::cache;
use crate::cache::key::derive_key;
use crate::errors::AppError;
use crate::generation::params::{GenerationParams, OutputFormat, Tone};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub content: String,
    pub was_hit: bool,
}

/// POST /api/v1/generate
///
/// Consults the prompt cache before and after the model call: identical
/// canonicalized requests are answered from storage without touching the LLM.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::Validation("prompt must not be empty".into()));
    }

    let key = derive_key(&req.prompt, req.tone, req.format);
    let params = GenerationParams {
        tone: req.tone,
        format: req.format,
    };
    let generator = state.generator.clone();
    let prompt = req.prompt.clone();

    let outcome = cache::store::get_or_generate(&state.db, &key, || async move {
        generator.generate(&prompt, &params).await
    })
    .await?;

    Ok(Json(GenerateResponse {
        content: outcome.content,
        was_hit: outcome.was_hit,
    }))
}
