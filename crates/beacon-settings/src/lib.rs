//! Process configuration, loaded once at startup from environment
//! variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BEACON_PORT` | `8080` | HTTP/WebSocket listen port |
//! | `JWT_SECRET` | *required* | bearer credential secret |
//! | `TIME_TOKEN_SECRET` | *required* | publish token secret |
//! | `TIME_WINDOW_SECONDS` | `3600` | time-token window size |
//! | `ALLOWED_CLOCK_SKEW` | `1` | windows of skew accepted |
//!
//! Malformed numeric values fall back to their defaults with a warning;
//! missing secrets are a startup error.

use std::env;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 3600;
pub const DEFAULT_ALLOWED_SKEW: i64 = 1;

/// Resolved process configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub jwt_secret: String,
    pub time_token_secret: String,
    pub time_window_secs: u64,
    pub allowed_skew: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            port: env_parsed("BEACON_PORT", DEFAULT_PORT),
            jwt_secret: env_required("JWT_SECRET")?,
            time_token_secret: env_required("TIME_TOKEN_SECRET")?,
            time_window_secs: env_parsed("TIME_WINDOW_SECONDS", DEFAULT_TIME_WINDOW_SECS),
            allowed_skew: env_parsed("ALLOWED_CLOCK_SKEW", DEFAULT_ALLOWED_SKEW),
        })
    }
}

fn env_required(key: &'static str) -> Result<String, SettingsError> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(SettingsError::MissingVar(key)),
    }
}

fn env_parsed<T: std::str::FromStr + Copy>(key: &'static str, default: T) -> T {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %value, "unparseable value, using default");
            default
        }),
        _ => default,
    }
}
