// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Absolute tolerance when comparing numeric fill-in-blank answers.
pub const FILL_BLANK_TOLERANCE: f64 = 1e-6;

/// Upper bound on questions assigned to one session.
pub const MAX_QUESTION_COUNT: i32 = 200;

/// Upper bound on a session's declared time budget.
pub const MAX_TIMEOUT_MINUTES: i32 = 1440;

/// Page size used when a grader lists pending answers without a limit.
pub const DEFAULT_PENDING_LIMIT: i64 = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: String,
    /// Seconds between two timeout sweeps.
    pub sweep_interval_secs: u64,
    /// How far back the sweep looks for in-progress sessions.
    pub sweep_lookback_hours: i64,
    /// Budget for sessions started without an explicit timeout.
    pub default_timeout_minutes: i32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr,
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", 300),
            sweep_lookback_hours: parse_var("SWEEP_LOOKBACK_HOURS", 24),
            default_timeout_minutes: parse_var("DEFAULT_TIMEOUT_MINUTES", 60)
                .clamp(1, MAX_TIMEOUT_MINUTES),
        }
    }
}

/// Reads an optional numeric variable, falling back to `default` when it is
/// unset or unparsable.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_numeric_var_uses_default() {
        assert_eq!(parse_var("QUESTIONNAIRE_TEST_UNSET_VAR", 42u64), 42);
    }
}
