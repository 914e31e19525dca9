//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use std::path::PathBuf;

use crate::error::{Error, Result};
use secrecy::SecretString;

/// Model used when `AI_MODEL` is unset.
pub const DEFAULT_AI_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Without a key the services score with the neutral fallback.
    pub anthropic_api_key: Option<SecretString>,
    pub ai_model: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Directory of source content files.
    pub content_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            anthropic_api_key: optional_var("ANTHROPIC_API_KEY").map(SecretString::from),
            ai_model: optional_var("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            content_dir: optional_var("CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("content")),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Unset and empty are treated alike.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
