// Error types for callgate
// Author: kelexine (https://github.com/kelexine)

use crate::utils::logging::sanitize;
use crate::utils::retry::parse_retry_after;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which deadline fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    /// A bare `with_timeout` around an arbitrary operation.
    Operation,
    /// Connection establishment phase.
    Connection,
    /// Response read phase.
    Read,
    /// End-to-end request, including admission queue wait.
    Request,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeoutKind::Operation => "operation",
            TimeoutKind::Connection => "connection",
            TimeoutKind::Read => "read",
            TimeoutKind::Request => "request",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Server error{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Server {
        status: Option<u16>,
        message: String,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Response parsing failed: {0}")]
    Parse(String),

    #[error("{kind} timeout after {}ms (configured {}ms)", .elapsed.as_millis(), .configured.as_millis())]
    Timeout {
        kind: TimeoutKind,
        configured: Duration,
        elapsed: Duration,
    },

    #[error("Request queue full ({active} active, {queued} queued, limit {max_queue_size})")]
    Backpressure {
        active: usize,
        queued: usize,
        max_queue_size: usize,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Payload-free tag for a [`GuardError`], used for retry dispatch and stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Authentication,
    RateLimit,
    Server,
    BadRequest,
    Parse,
    Timeout,
    Backpressure,
    Cancelled,
    Cache,
    Config,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Server => "server",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Parse => "parse",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Backpressure => "backpressure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Cache => "cache",
            ErrorKind::Config => "config",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GuardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::Network(_) => ErrorKind::Network,
            GuardError::Authentication(_) => ErrorKind::Authentication,
            GuardError::RateLimited { .. } => ErrorKind::RateLimit,
            GuardError::Server { .. } => ErrorKind::Server,
            GuardError::BadRequest(_) => ErrorKind::BadRequest,
            GuardError::Parse(_) => ErrorKind::Parse,
            GuardError::Timeout { .. } => ErrorKind::Timeout,
            GuardError::Backpressure { .. } => ErrorKind::Backpressure,
            GuardError::Cancelled => ErrorKind::Cancelled,
            GuardError::Cache(_) => ErrorKind::Cache,
            GuardError::Config(_) | GuardError::ConfigParsing(_) => ErrorKind::Config,
            GuardError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Server-supplied retry hint, only present on rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GuardError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map an upstream HTTP status and body onto the error taxonomy.
    ///
    /// Transports call this so classification stays in one place. A 429 body
    /// is scanned for a retry hint.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = body.to_string();
        match status {
            401 | 403 => GuardError::Authentication(message),
            408 => GuardError::Timeout {
                kind: TimeoutKind::Request,
                configured: Duration::ZERO,
                elapsed: Duration::ZERO,
            },
            429 => GuardError::RateLimited {
                retry_after: parse_retry_after(body),
                message,
            },
            400..=499 => GuardError::BadRequest(message),
            500..=599 => GuardError::Server {
                status: Some(status),
                message,
            },
            _ => GuardError::Unknown(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Short, stable, non-sensitive summary suitable for showing to a user.
    pub fn summary(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Network => "Could not reach the AI service. Check your connection.",
            ErrorKind::Authentication => "The AI service rejected the credentials.",
            ErrorKind::RateLimit => "The AI service is rate limiting requests. Try again shortly.",
            ErrorKind::Server => "The AI service reported an internal error.",
            ErrorKind::BadRequest => "The AI service rejected the request.",
            ErrorKind::Parse => "The AI service returned an unreadable response.",
            ErrorKind::Timeout => "The AI service took too long to respond.",
            ErrorKind::Backpressure => "Too many requests are pending. Try again shortly.",
            ErrorKind::Cancelled => "The request was cancelled.",
            ErrorKind::Cache => "A local cache error occurred.",
            ErrorKind::Config => "The request settings are invalid.",
            ErrorKind::Unknown => "An unexpected error occurred.",
        }
    }

    /// Display text with credentials masked. This is the only form that goes to logs.
    pub fn masked_message(&self) -> String {
        sanitize(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GuardError>;
