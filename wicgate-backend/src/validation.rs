/// Validation for configuration values and request parameters
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("API base URL is not a valid URL: {0}")]
    ApiBaseInvalid(String),

    #[error("API base URL must use http or https (got '{0}')")]
    ApiBaseScheme(String),

    #[error("Poll interval must be greater than zero")]
    PollIntervalZero,

    #[error("Attempt timeout must be greater than zero")]
    AttemptTimeoutZero,

    #[error("Retry delay list cannot be empty")]
    RetryDelaysEmpty,

    #[error("Retry delay '{0}' is not a number of milliseconds")]
    RetryDelayInvalid(String),

    #[error("Rate limit '{0}' must be greater than zero")]
    RateLimitZero(&'static str),

    #[error("Rate limit '{name}' cannot exceed {max}")]
    RateLimitTooHigh { name: &'static str, max: u64 },

    #[error("Server capacity must be between 1 and {max} (got {actual})")]
    CapacityOutOfRange { max: usize, actual: usize },
}

/// Validates the stats API base URL
///
/// Rules:
/// - Must parse as an absolute URL
/// - Scheme must be http or https
pub fn validate_api_base(api_base: &str) -> Result<(), ValidationError> {
    let url = Url::parse(api_base).map_err(|e| ValidationError::ApiBaseInvalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::ApiBaseScheme(other.to_string())),
    }
}

/// Parses a comma separated list of millisecond delays, e.g. "1000,2000,4000"
pub fn parse_retry_delays(raw: &str) -> Result<Vec<Duration>, ValidationError> {
    let delays = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ValidationError::RetryDelayInvalid(part.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if delays.is_empty() {
        return Err(ValidationError::RetryDelaysEmpty);
    }

    Ok(delays)
}

/// Validates a per-server capacity override
pub fn validate_capacity(capacity: usize) -> Result<(), ValidationError> {
    const MAX_CAPACITY: usize = 64;

    if capacity == 0 || capacity > MAX_CAPACITY {
        return Err(ValidationError::CapacityOutOfRange {
            max: MAX_CAPACITY,
            actual: capacity,
        });
    }

    Ok(())
}
