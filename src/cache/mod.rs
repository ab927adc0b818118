// Request cache module
// Author: kelexine (https://github.com/kelexine)

pub mod key;
pub mod manager;
pub mod models;

pub use key::{CacheKey, CacheKeyBuilder};
pub use manager::RequestCache;
pub use models::{CacheConfig, CacheEntry, CacheStats};
