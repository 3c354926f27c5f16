//! Roll Call service configuration.
//!
//! Configuration is loaded once at startup from environment variables.
//! Numeric settings have floors; values below them are rejected rather
//! than silently raised.

use crate::actors::rotation::MIN_ROTATION_INTERVAL;
use crate::code::{DEFAULT_CODE_LENGTH, MAX_CODE_LENGTH, MIN_CODE_LENGTH};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default SQLite database URL (file is created on first start).
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/attendance.db?mode=rwc";

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default code rotation interval in seconds.
pub const DEFAULT_ROTATION_INTERVAL_SECONDS: u64 = 15;

/// Default directory for CSV exports.
pub const DEFAULT_EXPORT_DIR: &str = "data";

/// Roll Call service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Channel operator commands must come from; shows the live code.
    pub admin_channel_id: u64,

    /// Channel participants submit from; never shows the code.
    pub attendance_channel_id: u64,

    /// SQLite connection URL.
    pub database_url: String,

    /// HTTP server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Time between code rotations.
    pub rotation_interval: Duration,

    /// Characters per attendance code.
    pub code_length: usize,

    /// Directory CSV exports are written to.
    pub export_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let admin_channel_id = parse_channel_id(vars, "ROLLCALL_ADMIN_CHANNEL_ID")?;
        let attendance_channel_id = parse_channel_id(vars, "ROLLCALL_ATTENDANCE_CHANNEL_ID")?;

        let database_url = vars
            .get("DATABASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let bind_address = vars
            .get("ROLLCALL_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let rotation_secs = match vars.get("CODE_ROTATION_INTERVAL") {
            Some(value) => value.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "CODE_ROTATION_INTERVAL must be a whole number of seconds: {e}"
                ))
            })?,
            None => DEFAULT_ROTATION_INTERVAL_SECONDS,
        };
        let rotation_interval = Duration::from_secs(rotation_secs);
        if rotation_interval < MIN_ROTATION_INTERVAL {
            return Err(ConfigError::InvalidValue(format!(
                "CODE_ROTATION_INTERVAL must be at least {} seconds, got {rotation_secs}",
                MIN_ROTATION_INTERVAL.as_secs()
            )));
        }

        let code_length = match vars.get("CODE_LENGTH") {
            Some(value) => value.trim().parse::<usize>().map_err(|e| {
                ConfigError::InvalidValue(format!("CODE_LENGTH must be a number: {e}"))
            })?,
            None => DEFAULT_CODE_LENGTH,
        };
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&code_length) {
            return Err(ConfigError::InvalidValue(format!(
                "CODE_LENGTH must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}, got {code_length}"
            )));
        }

        if admin_channel_id == attendance_channel_id {
            tracing::warn!(
                target: "rc.config",
                channel_id = admin_channel_id,
                "Admin and attendance channels are the same; the live code will be visible to participants"
            );
        }

        let export_dir = vars
            .get("ROLLCALL_EXPORT_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR), PathBuf::from);

        Ok(Config {
            admin_channel_id,
            attendance_channel_id,
            database_url,
            bind_address,
            rotation_interval,
            code_length,
            export_dir,
        })
    }
}

fn parse_channel_id(vars: &HashMap<String, String>, name: &str) -> Result<u64, ConfigError> {
    let raw = vars
        .get(name)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))?;
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ConfigError::InvalidValue(format!(
            "{name} must be a positive integer, got '{raw}'"
        ))),
    }
}
