// Cache tests - public API only
// Author: kelexine (https://github.com/kelexine)

use callgate::cache::{CacheConfig, CacheKey, RequestCache};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

fn cache(max_entries: usize) -> RequestCache {
    RequestCache::new(CacheConfig {
        max_entries,
        ..CacheConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_oldest_entry_evicted_at_capacity() {
    let cache = cache(2);
    cache.put("A", json!("a"), None);
    cache.put("B", json!("b"), None);
    cache.put("C", json!("c"), None);

    assert!(cache.get("A").is_none());
    assert_eq!(cache.get("B"), Some(json!("b")));
    assert_eq!(cache.get("C"), Some(json!("c")));
    assert_eq!(cache.stats().evictions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_recent_access_protects_entry() {
    let cache = cache(2);
    cache.put("A", json!(1), None);
    cache.put("B", json!(2), None);
    assert!(cache.get("A").is_some());
    cache.put("C", json!(3), None);

    assert!(cache.exists("A"));
    assert!(!cache.exists("B"));
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_ttl() {
    let cache = cache(10);
    cache.put("short", json!("v"), Some(Duration::from_millis(100)));

    tokio::time::advance(Duration::from_millis(99)).await;
    assert_eq!(cache.get("short"), Some(json!("v")));
    assert_eq!(cache.ttl_remaining("short"), Some(Duration::from_millis(1)));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(cache.get("short").is_none());
    assert_eq!(cache.stats().expirations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_by_pattern() {
    let cache = cache(10);
    let summary = CacheKey::builder("summary").content("doc").build();
    let translate = CacheKey::builder("translate").content("doc").build();
    cache.put(summary.as_str(), json!("s"), None);
    cache.put(translate.as_str(), json!("t"), None);

    assert_eq!(cache.remove_by_pattern("summary:*").unwrap(), 1);
    assert!(!cache.exists(summary.as_str()));
    assert!(cache.exists(translate.as_str()));
}

#[test]
fn test_equal_inputs_give_equal_keys() {
    let first = CacheKey::builder("explain")
        .content("fn main() {}")
        .attribute("language", "rust")
        .attribute("format", "markdown")
        .build();
    let second = CacheKey::builder("explain")
        .content("fn main() {}")
        .attribute("format", "markdown")
        .attribute("language", "rust")
        .build();
    let other = CacheKey::builder("explain")
        .content("fn main() {}")
        .attribute("language", "go")
        .build();

    assert_eq!(first, second);
    assert_ne!(first, other);
}

proptest! {
    #[test]
    fn prop_get_hits_only_within_ttl(ttl_ms in 1u64..5_000, probe_ms in 0u64..10_000) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        let hit = runtime.block_on(async {
            let cache = cache(4);
            cache.put("k", json!(ttl_ms), Some(Duration::from_millis(ttl_ms)));
            tokio::time::advance(Duration::from_millis(probe_ms)).await;
            cache.get("k").is_some()
        });

        prop_assert_eq!(hit, probe_ms < ttl_ms);
    }
}
