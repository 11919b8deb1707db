// =============================================================================
// Ecoledger Backend - Configuration
// =============================================================================

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "127.0.0.1:7100")
    pub bind_address: String,

    /// Database URL (SQLite path)
    pub database_url: String,

    /// Interval for the in-process overdue sweeper, in seconds.
    /// Unset means no background task; an external cron hits /api/dues/sweep.
    pub sweep_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:7100".into()),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:ecoledger.db".into()),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .map(|v| v.parse().map_err(|_| ConfigError::Invalid("SWEEP_INTERVAL_SECS")))
                .transpose()?,
        })
    }
}

// Every key falls back to a default, so only malformed values can fail.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
