// Guarded call path
// Author: kelexine (https://github.com/kelexine)

pub mod executor;
pub mod models;

pub use executor::RequestPipeline;
pub use models::{CallContext, GuardSnapshot, GuardedRequest, PipelineStage, PipelineStats};
