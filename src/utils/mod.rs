//! Cross-cutting helpers for callgate.
//!
//! # Submodules
//!
//! - `logging`: Tracing initialization and credential masking.
//! - `retry`: Server retry-hint parsing and jittered backoff draws.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
