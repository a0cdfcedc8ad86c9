use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::generation::ContentGenerator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Pluggable generation pipeline. Production: Anthropic client. Tests swap
    /// in a stub so no cache test ever touches the network.
    pub generator: Arc<dyn ContentGenerator>,
    pub config: Config,
}
