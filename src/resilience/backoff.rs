//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Upper bound of the multiplicative jitter factor: delays grow by up to 30%.
pub const MAX_JITTER_FACTOR: f64 = 0.3;

/// Calculate the delay before attempt number `attempt` (0-based).
///
/// `delay = min(base * multiplier^attempt, max)`, then scaled by
/// `1 + U(0, 0.3)` when `jitter` is set.
pub fn calculate_backoff(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter: bool,
) -> Duration {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let exponential = base_ms as f64 * multiplier.powi(exponent);
    let capped = if exponential.is_finite() {
        exponential.min(max_ms as f64)
    } else {
        max_ms as f64
    };

    let factor = if jitter {
        1.0 + rand::thread_rng().gen_range(0.0..=MAX_JITTER_FACTOR)
    } else {
        1.0
    };

    Duration::from_millis((capped * factor).round() as u64)
}
