pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers as generation_handlers;
use crate::session::handlers as session_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session state engine
        .route(
            "/api/v1/session/context",
            get(session_handlers::handle_load_context).post(session_handlers::handle_save_context),
        )
        .route(
            "/api/v1/session/checkpoints",
            get(session_handlers::handle_list_checkpoints)
                .post(session_handlers::handle_create_checkpoint),
        )
        .route(
            "/api/v1/session/checkpoints/:id",
            get(session_handlers::handle_get_checkpoint)
                .delete(session_handlers::handle_delete_checkpoint),
        )
        .route(
            "/api/v1/session/checkpoints/:id/restore",
            post(session_handlers::handle_restore),
        )
        .route(
            "/api/v1/session/migrate",
            post(session_handlers::handle_migrate),
        )
        // Generation (cache-fronted)
        .route("/api/v1/generate", post(generation_handlers::handle_generate))
        .with_state(state)
}
