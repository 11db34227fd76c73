//! Configuration module
//!
//! Environment-driven configuration with sane defaults for every numeric
//! knob. Only `DATABASE_URL` is required.

use std::env;

use crate::constants;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub environment: String,
    /// Days an invitation token stays valid after issue or resend.
    pub invite_expiry_days: i64,
    /// Random bytes per invitation token (hex-encoded to twice as many chars).
    pub invite_token_bytes: usize,
    /// TTL for cached permission resolutions, seconds.
    pub permission_cache_ttl_seconds: i64,
    /// Cap on per-row errors kept in a bulk import report.
    pub import_error_cap: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            database_url,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            environment,
            invite_expiry_days: env::var("INVITE_EXPIRY_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(constants::INVITE_EXPIRY_DAYS),
            invite_token_bytes: env::var("INVITE_TOKEN_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(constants::INVITE_TOKEN_BYTES),
            permission_cache_ttl_seconds: env::var("PERMISSION_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(constants::PERMISSION_CACHE_TTL_SECS),
            import_error_cap: env::var("IMPORT_ERROR_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(constants::IMPORT_ERROR_CAP),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
