// Retry hint parsing and backoff construction
// Author: kelexine (https://github.com/kelexine)

use backoff::{backoff::Backoff, ExponentialBackoff};
use serde_json::Value;
use std::time::Duration;

/// Upper bound on any server-supplied retry hint.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(60);

/// Extract a server retry hint from an error body.
///
/// Understands Google RPC `RetryInfo` details (`"retryDelay": "0.457s"`) and
/// bare values such as `"40s"`, `"1.5s"` or `"12"` (seconds, as sent in a
/// `Retry-After` header). Returns `None` when nothing usable is found.
pub fn parse_retry_after(body: &str) -> Option<Duration> {
    if let Some(delay) = parse_retry_info(body) {
        return Some(delay);
    }
    parse_duration_string(body.trim())
}

fn parse_retry_info(error_json: &str) -> Option<Duration> {
    let parsed: Value = serde_json::from_str(error_json).ok()?;

    // error.details[] -> RetryInfo -> retryDelay
    let details = parsed.get("error")?.get("details")?.as_array()?;

    for detail in details {
        let is_retry_info = detail
            .get("@type")
            .and_then(|t| t.as_str())
            .map(|t| t.ends_with("google.rpc.RetryInfo"))
            .unwrap_or(false);
        if is_retry_info {
            if let Some(retry_delay) = detail.get("retryDelay").and_then(|v| v.as_str()) {
                return parse_duration_string(retry_delay);
            }
        }
    }

    None
}

/// Parse "0.457639761s", "40s", "1.5s" or plain seconds, capped at [`MAX_RETRY_HINT`].
fn parse_duration_string(duration_str: &str) -> Option<Duration> {
    let seconds_str = duration_str.strip_suffix('s').unwrap_or(duration_str);
    let seconds: f64 = seconds_str.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let capped_seconds = seconds.min(MAX_RETRY_HINT.as_secs_f64());
    Some(Duration::from_millis((capped_seconds * 1000.0) as u64))
}

/// Draw one jittered delay around `interval`.
///
/// The interval is capped at `max_interval` before jitter is applied, so the
/// result lies in `interval * (1 ± randomization_factor)`.
pub fn jittered_delay(interval: Duration, max_interval: Duration, randomization_factor: f64) -> Duration {
    let interval = interval.min(max_interval);
    let mut backoff = ExponentialBackoff {
        current_interval: interval,
        initial_interval: interval,
        randomization_factor: randomization_factor.clamp(0.0, 1.0),
        multiplier: 2.0,
        max_interval,
        max_elapsed_time: None,
        ..Default::default()
    };
    backoff.next_backoff().unwrap_or(interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_info() {
        let error_json = r#"{
  "error": {
    "code": 429,
    "message": "Rate limited",
    "details": [
      {
        "@type": "type.googleapis.com/google.rpc.RetryInfo",
        "retryDelay": "0.457639761s"
      }
    ]
  }
}"#;
        let delay = parse_retry_after(error_json).unwrap();
        assert_eq!(delay.as_millis(), 457);
    }

    #[test]
    fn test_parse_duration_string() {
        assert_eq!(parse_duration_string("40s").unwrap().as_secs(), 40);
        assert_eq!(parse_duration_string("1.5s").unwrap().as_millis(), 1500);
        assert_eq!(parse_duration_string("12").unwrap().as_secs(), 12);
        assert_eq!(parse_duration_string("120s").unwrap().as_secs(), 60);
        assert!(parse_duration_string("-1s").is_none());
        assert!(parse_duration_string("soon").is_none());
    }

    #[test]
    fn test_unparseable_body_has_no_hint() {
        assert!(parse_retry_after(r#"{"error": {"message": "slow down"}}"#).is_none());
    }

    #[test]
    fn test_jitter_free_delay_is_exact() {
        let d = jittered_delay(Duration::from_millis(400), Duration::from_secs(1), 0.0);
        assert_eq!(d, Duration::from_millis(400));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        for _ in 0..100 {
            let d = jittered_delay(Duration::from_millis(1000), Duration::from_secs(30), 0.25);
            assert!(d >= Duration::from_millis(750) && d <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_delay_capped_before_jitter() {
        let d = jittered_delay(Duration::from_secs(10), Duration::from_secs(2), 0.0);
        assert_eq!(d, Duration::from_secs(2));
    }
}
