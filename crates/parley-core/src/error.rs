//! Error types for commands, reasoning calls, and configuration

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::reasoning::retry::{is_retryable_status, IsRetryable};

/// Why a command session ended without a clean exit
///
/// The `Display` text is what callers see in `ToolOutput::error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No command token could be pulled out of the user's text
    #[error("Could not extract command")]
    NoCommand,

    /// No exit event arrived before the deadline
    #[error("Command timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// The event channel went away while waiting for the exit event
    #[error("Command runtime disconnected")]
    RuntimeDisconnected,

    /// The command ran and exited non-zero
    #[error("Command exited with code {0}")]
    NonZeroExit(i32),
}

/// Grounded reasoning call errors
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// Transport failure (connect, TLS, body read)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status from the API
    #[error("API error: {status} - {message}")]
    Status {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Response body did not have the expected shape
    #[error("unexpected response: {0}")]
    Parse(String),

    /// The call took longer than the configured limit
    #[error("reasoning call timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// No API key found in the configured environment variable
    #[error("missing API key: set {0}")]
    MissingApiKey(String),
}

impl IsRetryable for ReasoningError {
    fn is_retryable(&self) -> bool {
        match self {
            ReasoningError::Http(e) => e.is_timeout() || e.is_connect(),
            ReasoningError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ReasoningError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
