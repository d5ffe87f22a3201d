//! Jitter helpers for retry backoff

use rand::Rng;
use std::time::Duration;

/// Uniform jitter between 0 and `max_jitter_ms` (inclusive)
///
/// # Examples
/// ```
/// use epg_harvester::utils::jitter::generate_jitter_ms;
///
/// let jitter = generate_jitter_ms(100);
/// assert!(jitter <= 100);
/// ```
pub fn generate_jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    rand::rng().random_range(0..=max_jitter_ms)
}

/// Uniform jitter between zero and `max`, millisecond resolution
pub fn generate_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(generate_jitter_ms(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_jitter_ms() {
        assert_eq!(generate_jitter_ms(0), 0);

        for _ in 0..100 {
            let jitter = generate_jitter_ms(50);
            assert!(jitter <= 50);
        }
    }

    #[test]
    fn test_generate_jitter_duration() {
        assert_eq!(generate_jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(generate_jitter(Duration::from_millis(500)) <= Duration::from_millis(500));
        }
    }
}
