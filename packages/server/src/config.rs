use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Root directory for the on-disk activity-file cache (`<downloads>/<source>/<sport_code>/<source_id>.fit`).
    pub downloads_dir: PathBuf,
    /// 32-byte key (hex-encoded) used by `SecretStore` for AES-GCM encryption at rest.
    pub encryption_key: String,
    /// Window (seconds) within which a sink activity's start time confirms a duplicate upload.
    pub duplicate_confirm_window_seconds: i64,
    /// Number of days either side of a target date searched by `DuplicateProbe`.
    pub duplicate_confirm_search_days: i64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            downloads_dir: env::var("DOWNLOADS_DIR")
                .unwrap_or_else(|_| "./downloads".to_string())
                .into(),
            encryption_key: env::var("ENCRYPTION_KEY").context("ENCRYPTION_KEY must be set")?,
            duplicate_confirm_window_seconds: env::var("DUPLICATE_CONFIRM_WINDOW_SECONDS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .context("DUPLICATE_CONFIRM_WINDOW_SECONDS must be a valid number")?,
            duplicate_confirm_search_days: env::var("DUPLICATE_CONFIRM_SEARCH_DAYS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .context("DUPLICATE_CONFIRM_SEARCH_DAYS must be a valid number")?,
        })
    }
}
