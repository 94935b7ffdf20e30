//! Fibonacci backoff for reconcile retries.
//!
//! The sequence is calculated in minutes to align with GitOps tool
//! conventions: 1m, 1m, 2m, 3m, 5m, 8m, 10m (capped), indexed by the number
//! of consecutive errors a resource has accumulated.

use std::time::Duration;

/// Backoff duration for the nth consecutive error (1-indexed).
///
/// `min_minutes` is the first two values of the sequence, `max_minutes` caps
/// it. An error count of zero behaves like one.
pub fn backoff_for_error_count(error_count: u32, min_minutes: u64, max_minutes: u64) -> Duration {
    if error_count <= 2 {
        return Duration::from_secs(min_minutes * 60);
    }

    let mut prev = min_minutes;
    let mut current = min_minutes;
    for _ in 2..error_count {
        let next = prev + current;
        prev = current;
        current = std::cmp::min(next, max_minutes);
        if current >= max_minutes {
            break;
        }
    }

    Duration::from_secs(current * 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fibonacci_sequence() {
        // 1m, 1m, 2m, 3m, 5m, 8m, 10m (max)
        let seconds: Vec<u64> = (1..=7)
            .map(|n| backoff_for_error_count(n, 1, 10).as_secs())
            .collect();
        assert_eq!(seconds, vec![60, 60, 120, 180, 300, 480, 600]);
    }

    #[test]
    fn test_caps_at_max() {
        assert_eq!(backoff_for_error_count(8, 1, 10).as_secs(), 600);
        assert_eq!(backoff_for_error_count(100, 1, 10).as_secs(), 600);
    }

    #[test]
    fn test_zero_errors_uses_min() {
        assert_eq!(backoff_for_error_count(0, 1, 10).as_secs(), 60);
    }
}
