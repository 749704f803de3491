use rand::{Rng, RngCore};
use std::time::Duration;

/// Linear backoff before retry `attempt` (1-based): `base * attempt`.
pub(crate) fn linear_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt.max(1))
}

pub(crate) fn jittered_backoff(rng: &mut impl RngCore, backoff: Duration) -> Duration {
    let backoff_ms = backoff.as_millis() as u64;
    if backoff_ms <= 1 {
        return backoff;
    }

    // "Equal jitter": delay is in [backoff/2, backoff].
    let half_ms = backoff_ms / 2;
    let jitter_ms = rng.gen_range(0..=half_ms);
    Duration::from_millis(half_ms.saturating_add(jitter_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::GameRng;

    #[test]
    fn test_linear_backoff_grows_with_attempts() {
        let base = Duration::from_millis(25);
        assert_eq!(linear_backoff(base, 1), Duration::from_millis(25));
        assert_eq!(linear_backoff(base, 4), Duration::from_millis(100));
        assert_eq!(linear_backoff(base, 0), Duration::from_millis(25));
    }

    #[test]
    fn test_jitter_stays_within_equal_jitter_window() {
        let mut rng = GameRng::from_seed(4);
        let backoff = Duration::from_millis(100);
        for _ in 0..200 {
            let delay = jittered_backoff(&mut rng, backoff);
            assert!(delay >= Duration::from_millis(50) && delay <= backoff);
        }
        assert_eq!(jittered_backoff(&mut rng, Duration::ZERO), Duration::ZERO);
    }
}
