// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Hard cap applied to attempts whose assessment has neither a duration nor
/// an end date. Overridable via DEFAULT_ATTEMPT_CAP_MINUTES.
pub const DEFAULT_ATTEMPT_CAP_MINUTES: i64 = 180;

/// Judge polling: fixed backoff between result polls, and the cutoff after
/// which a test case is reported as still processing instead of blocking.
pub const JUDGE_POLL_INTERVAL_MS: u64 = 1000;
pub const JUDGE_POLL_MAX_ATTEMPTS: u32 = 20;

/// Per-test-case execution limits forwarded to the judge service.
pub const JUDGE_CPU_TIME_LIMIT_SECONDS: f64 = 5.0;
pub const JUDGE_MEMORY_LIMIT_KB: i64 = 128_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub judge_url: String,
    pub judge_api_key: Option<String>,
    pub attempt_cap_minutes: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86400);

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let admin_username = env::var("ADMIN_USERNAME").ok();
        let admin_password = env::var("ADMIN_PASSWORD").ok();

        let judge_url =
            env::var("JUDGE_URL").unwrap_or_else(|_| "http://localhost:2358".to_string());
        let judge_api_key = env::var("JUDGE_API_KEY").ok();

        let attempt_cap_minutes = env::var("DEFAULT_ATTEMPT_CAP_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ATTEMPT_CAP_MINUTES);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username,
            admin_password,
            judge_url,
            judge_api_key,
            attempt_cap_minutes,
        }
    }
}
