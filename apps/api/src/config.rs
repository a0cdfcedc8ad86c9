use anyhow::{Context, Result};

use crate::session::migration::CollisionPolicy;

/// Application configuration loaded from environment variables.
/// Panics at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// What migration does when a guest conversation id collides with one the
    /// authenticated user already owns. Default: rename.
    pub migration_collision_policy: CollisionPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            migration_collision_policy: std::env::var("MIGRATION_COLLISION_POLICY")
                .unwrap_or_else(|_| "rename".to_string())
                .parse()
                .context("MIGRATION_COLLISION_POLICY must be 'rename' or 'merge'")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
