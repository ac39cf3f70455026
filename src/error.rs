use std::time::Duration;
use thiserror::Error;

use crate::events::FallbackReason;

/// Errors that can occur while fetching from an upstream source
///
/// Source clients never surface these to their caller. They decide whether a
/// request is retried and which fallback tag the synthetic observation gets.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Upstream server error: HTTP {0}")]
    Server(u16),

    #[error("Authentication rejected: HTTP {0}")]
    Auth(u16),

    #[error("Upstream rejected request: HTTP {0}")]
    Client(u16),

    #[error("Invalid payload: {0}")]
    Validation(String),
}

impl SourceError {
    /// Whether the retry decorator should try again after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Transport(_)
                | SourceError::Timeout
                | SourceError::RateLimited { .. }
                | SourceError::Server(_)
        )
    }

    /// Server-supplied delay hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Tag carried by the synthetic observation that replaces a failed fetch
    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            SourceError::Auth(_) => FallbackReason::AuthFailure,
            _ => FallbackReason::Fallback,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(error: serde_json::Error) -> Self {
        SourceError::Validation(error.to_string())
    }
}

/// Errors raised by the risk engine for observations that break its input contract
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssessmentError {
    #[error("Observation '{source_id}' is malformed: {reason}")]
    MalformedObservation { source_id: String, reason: String },
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Channel rejected message: HTTP {status}: {description}")]
    Rejected { status: u16, description: String },

    #[error("Channel transport failed: {0}")]
    Transport(#[from] SourceError),
}

/// Cycle-level failures isolated by the monitoring loop
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Assessment failed: {0}")]
    Assessment(#[from] AssessmentError),

    #[error("Cycle panicked: {0}")]
    Panicked(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
