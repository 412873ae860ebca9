use chrono::Duration;

use crate::task::BackoffPolicy;

/// Delay before the next attempt, given the attempt count that just failed.
///
/// `linear`: `base * attempts`. `exponential`: `base * 2^(attempts - 1)`. Both
/// are clamped to `max_delay` so a long-running retry storm can't make
/// `due_at` run away to the end of time.
pub fn compute_delay(
    policy: BackoffPolicy,
    attempts: i32,
    base_delay: Duration,
    max_delay: Duration,
) -> Duration {
    let attempts = attempts.max(1) as u32;
    let delay = match policy {
        BackoffPolicy::Linear => base_delay * attempts as i32,
        BackoffPolicy::Exponential => {
            // 2^(attempts - 1); cap the exponent so this can't overflow before
            // the `.min(max_delay)` below ever gets a chance to run.
            let exponent = (attempts - 1).min(32);
            base_delay * 2i32.checked_pow(exponent).unwrap_or(i32::MAX)
        }
    };
    delay.min(max_delay)
}

/// Spreads a delay by up to ±10% so a burst of tasks that failed together
/// don't all come due on the same tick and reclaim the same worker slot.
/// Re-clamped to `max_delay` since the jitter can push a delay already at
/// the cap slightly over it.
pub fn jitter(delay: Duration, max_delay: Duration) -> Duration {
    let delay_ms = delay.num_milliseconds().max(0) as f64;
    let factor = 0.9 + fastrand::f64() * 0.2;
    Duration::milliseconds((delay_ms * factor).round() as i64).min(max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn linear_scales_with_attempt_count() {
        let base = secs(1);
        let max = secs(60);
        assert_eq!(compute_delay(BackoffPolicy::Linear, 1, base, max), secs(1));
        assert_eq!(compute_delay(BackoffPolicy::Linear, 2, base, max), secs(2));
        assert_eq!(compute_delay(BackoffPolicy::Linear, 5, base, max), secs(5));
    }

    #[test]
    fn exponential_doubles_each_attempt() {
        let base = secs(1);
        let max = secs(60);
        assert_eq!(
            compute_delay(BackoffPolicy::Exponential, 1, base, max),
            secs(1)
        );
        assert_eq!(
            compute_delay(BackoffPolicy::Exponential, 2, base, max),
            secs(2)
        );
        assert_eq!(
            compute_delay(BackoffPolicy::Exponential, 3, base, max),
            secs(4)
        );
        assert_eq!(
            compute_delay(BackoffPolicy::Exponential, 4, base, max),
            secs(8)
        );
    }

    #[test]
    fn both_policies_saturate_at_max_delay() {
        let base = secs(1);
        let max = secs(60);
        assert_eq!(
            compute_delay(BackoffPolicy::Exponential, 10, base, max),
            secs(60)
        );
        assert_eq!(
            compute_delay(BackoffPolicy::Linear, 1000, base, max),
            secs(60)
        );
    }

    #[test]
    fn attempts_of_zero_behaves_like_one() {
        let base = secs(1);
        let max = secs(60);
        assert_eq!(compute_delay(BackoffPolicy::Linear, 0, base, max), secs(1));
        assert_eq!(
            compute_delay(BackoffPolicy::Exponential, 0, base, max),
            secs(1)
        );
    }

    #[test]
    fn jitter_stays_within_ten_percent_of_the_base_delay() {
        let base = secs(10);
        let max = secs(60);
        for _ in 0..100 {
            let jittered = jitter(base, max);
            assert!(jittered >= secs(9) && jittered <= secs(11));
        }
    }

    #[test]
    fn jitter_never_exceeds_max_delay() {
        let base = secs(60);
        let max = secs(60);
        for _ in 0..100 {
            assert!(jitter(base, max) <= max);
        }
    }
}
