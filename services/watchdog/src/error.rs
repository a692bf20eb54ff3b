//! Watchdog error types

use std::time::Duration;

/// Errors raised by the watchdog's collaborators
#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("`{program}` exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid output: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for WatchdogError {
    fn from(e: config::ConfigError) -> Self {
        WatchdogError::Config(e.to_string())
    }
}

/// Result type for watchdog operations
pub type Result<T> = std::result::Result<T, WatchdogError>;
