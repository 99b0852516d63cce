use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;
use wicgate_live::{RetryPolicy, SyncConfig};

use crate::validation::{self, ValidationError};

const MAX_ADMIN_PER_MIN: u64 = 60_000;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the stats API; the live snapshot is read from `{api_base}/online`
    /// Env: API_BASE (default: "https://www.wicgate.com/api")
    pub api_base: String,

    /// Interval between background refreshes, also the delay before a recovery attempt
    /// Env: POLL_INTERVAL_SECS (default: 90)
    pub poll_interval: Duration,

    /// Backoff delays between retries, in milliseconds
    /// Env: RETRY_DELAYS_MS (default: "1000,2000,4000")
    pub retry_delays: Vec<Duration>,

    /// Retries after the first failed attempt
    /// Env: MAX_RETRIES (default: 3)
    pub max_retries: u32,

    /// Upper bound on a single request to the stats API
    /// Env: ATTEMPT_TIMEOUT_SECS (default: 10)
    pub attempt_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 16384 = 16KB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Bearer token for the admin routes
    /// Env: ADMIN_TOKEN (optional, admin routes are not mounted without it)
    pub admin_token: Option<String>,

    /// Rate limit for public read endpoints (requests per second)
    /// Env: RATE_LIMIT_PUBLIC_PER_SEC (default: 10)
    pub rate_limit_public_per_sec: u64,

    /// Burst size for public read endpoints
    /// Env: RATE_LIMIT_PUBLIC_BURST (default: 20)
    pub rate_limit_public_burst: u32,

    /// Rate limit for admin endpoints (requests per minute)
    /// Env: RATE_LIMIT_ADMIN_PER_MIN (default: 30)
    pub rate_limit_admin_per_min: u64,

    /// Burst size for admin endpoints
    /// Env: RATE_LIMIT_ADMIN_BURST (default: 5)
    pub rate_limit_admin_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ValidationError> {
        let _ = dotenv(); //for debugging mostly
        let config = Self {
            api_base: env_or_default_string("API_BASE", "https://www.wicgate.com/api"),
            poll_interval: Duration::from_secs(env_or_default("POLL_INTERVAL_SECS", 90)),
            retry_delays: validation::parse_retry_delays(&env_or_default_string(
                "RETRY_DELAYS_MS",
                "1000,2000,4000",
            ))?,
            max_retries: env_or_default("MAX_RETRIES", 3),
            attempt_timeout: Duration::from_secs(env_or_default("ATTEMPT_TIMEOUT_SECS", 10)),
            port: env_or_default("PORT", 3000),
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", 16 * 1024),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            admin_token: var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            rate_limit_public_per_sec: env_or_default("RATE_LIMIT_PUBLIC_PER_SEC", 10),
            rate_limit_public_burst: env_or_default("RATE_LIMIT_PUBLIC_BURST", 20),
            rate_limit_admin_per_min: env_or_default("RATE_LIMIT_ADMIN_PER_MIN", 30),
            rate_limit_admin_burst: env_or_default("RATE_LIMIT_ADMIN_BURST", 5),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the live store or the router cannot run with
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_api_base(&self.api_base)?;
        if self.poll_interval.is_zero() {
            return Err(ValidationError::PollIntervalZero);
        }
        if self.attempt_timeout.is_zero() {
            return Err(ValidationError::AttemptTimeoutZero);
        }
        if self.retry_delays.is_empty() {
            return Err(ValidationError::RetryDelaysEmpty);
        }
        if self.rate_limit_public_per_sec == 0 || self.rate_limit_public_burst == 0 {
            return Err(ValidationError::RateLimitZero("public"));
        }
        if self.rate_limit_admin_per_min == 0 || self.rate_limit_admin_burst == 0 {
            return Err(ValidationError::RateLimitZero("admin"));
        }
        // The admin limiter refills once every 60_000 / per_min milliseconds
        if self.rate_limit_admin_per_min > MAX_ADMIN_PER_MIN {
            return Err(ValidationError::RateLimitTooHigh {
                name: "admin",
                max: MAX_ADMIN_PER_MIN,
            });
        }
        Ok(())
    }

    /// Polling and retry settings for the live store
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: self.poll_interval,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                delays: self.retry_delays.clone(),
                attempt_timeout: self.attempt_timeout,
            },
        }
    }

    pub fn rate_limit(&self) -> crate::RateLimitConfig {
        crate::RateLimitConfig {
            public_per_sec: self.rate_limit_public_per_sec,
            public_burst: self.rate_limit_public_burst,
            admin_per_min: self.rate_limit_admin_per_min,
            admin_burst: self.rate_limit_admin_burst,
        }
    }
}

impl Default for Config {
    /// Create configuration with all default values
    fn default() -> Self {
        Self {
            api_base: "https://www.wicgate.com/api".to_string(),
            poll_interval: Duration::from_secs(90),
            retry_delays: vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ],
            max_retries: 3,
            attempt_timeout: Duration::from_secs(10),
            port: 3000,
            request_body_limit: 16 * 1024, // 16 KB
            request_timeout: Duration::from_secs(30),
            admin_token: None,
            rate_limit_public_per_sec: 10,
            rate_limit_public_burst: 20,
            rate_limit_admin_per_min: 30,
            rate_limit_admin_burst: 5,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
