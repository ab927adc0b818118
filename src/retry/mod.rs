// Retry with classified, capped, jittered exponential backoff
// Author: kelexine (https://github.com/kelexine)

pub mod coordinator;
pub mod policy;

pub use coordinator::{RetryCoordinator, RetryStats};
pub use policy::RetryPolicy;
