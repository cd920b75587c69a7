//! Retry classification and backoff for outbound tool calls.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

use crate::types::ExecutorConfig;

/// Returns `true` if the HTTP status code is transient and worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Delay before retry number `attempt + 1`.
///
/// Exponential from `backoff_base`, capped at `backoff_max`. A server
/// `Retry-After` hint can only lengthen the delay (capped at
/// `max_retry_after`), so delays never decrease across attempts.
pub fn backoff_delay(config: &ExecutorConfig, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(31));
    let computed = config
        .backoff_base
        .saturating_mul(factor)
        .min(config.backoff_max);
    match retry_after {
        Some(hint) => computed.max(hint.min(config.max_retry_after)),
        None => computed,
    }
}

/// Parse a delta-seconds `Retry-After` header.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
