//! Structured logging and credential masking.
//!
//! This module configures the `tracing` ecosystem for callgate and provides
//! the masking used before any error text reaches a log sink. Only the error
//! kind and a masked message are ever logged; raw upstream payloads and keys
//! are not.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{GuardError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for ingestion.
/// - `pretty` (default): Human-readable output for development.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// returns a configuration error instead of panicking.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| GuardError::Config(format!("logging already initialized: {}", e)))
}

lazy_static! {
    static ref SECRET_PATTERNS: Vec<(Regex, &'static str)> = vec![
        // Provider API keys (OpenAI/Anthropic style)
        (
            Regex::new(r"sk-[A-Za-z0-9_\-]{6,}").expect("valid regex"),
            "[REDACTED_API_KEY]",
        ),
        // Google OAuth2 access tokens
        (
            Regex::new(r"ya29\.[A-Za-z0-9_\-\.]+").expect("valid regex"),
            "[REDACTED_ACCESS_TOKEN]",
        ),
        // Authorization headers
        (
            Regex::new(r"(?i)bearer\s+[A-Za-z0-9_\-\.=]+").expect("valid regex"),
            "Bearer [REDACTED]",
        ),
        // key=value / "key": "value" pairs
        (
            Regex::new(r#"(?i)(api[_-]?key|access[_-]?token|secret)(["']?\s*[:=]\s*["']?)[^\s"'&,}]+"#)
                .expect("valid regex"),
            "${1}${2}[REDACTED]",
        ),
    ];
}

/// Masks credentials in a message before it is logged or surfaced.
///
/// Every occurrence of every known pattern is replaced, not just the first.
pub fn sanitize(input: &str) -> String {
    let mut result = input.to_string();
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        if pattern.is_match(&result) {
            result = pattern.replace_all(&result, *replacement).into_owned();
        }
    }
    result
}
