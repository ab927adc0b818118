// callgate - Request resilience and concurrency control for outbound calls
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod ratelimit;
pub mod retry;
pub mod timeout;
pub mod utils;

pub use error::{ErrorKind, GuardError, Result};
pub use pipeline::{CallContext, GuardedRequest, RequestPipeline};
