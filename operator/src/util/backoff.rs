use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a deterministic ceiling and random jitter.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

/// Requeue schedule for failed reconciles: 5s, 10s, 20s, ... capped at 5m.
pub const RECONCILE_BACKOFF: Backoff = Backoff {
    base: Duration::from_secs(5),
    cap: Duration::from_secs(300),
};

/// Retry schedule for Keycloak HTTP calls inside one reconcile:
/// 500ms, 1s, 2s, ... capped at 30s.
pub const SESSION_BACKOFF: Backoff = Backoff {
    base: Duration::from_millis(500),
    cap: Duration::from_secs(30),
};

/// Attempts per reconcile for connection failures and 5xx responses.
pub const SESSION_ATTEMPTS: u32 = 5;

impl Backoff {
    /// Deterministic delay for the given zero-based attempt.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap)
    }

    /// Ceiling plus up to 25% jitter so that a fleet of failing resources
    /// does not requeue in lockstep.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let jitter_ms = ceiling.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return ceiling;
        }
        ceiling + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_doubles_until_the_cap() {
        assert_eq!(RECONCILE_BACKOFF.ceiling(0), Duration::from_secs(5));
        assert_eq!(RECONCILE_BACKOFF.ceiling(1), Duration::from_secs(10));
        assert_eq!(RECONCILE_BACKOFF.ceiling(3), Duration::from_secs(40));
        assert_eq!(RECONCILE_BACKOFF.ceiling(10), Duration::from_secs(300));
        assert_eq!(RECONCILE_BACKOFF.ceiling(63), Duration::from_secs(300));
    }

    #[test]
    fn session_backoff_caps_at_thirty_seconds() {
        assert_eq!(SESSION_BACKOFF.ceiling(0), Duration::from_millis(500));
        assert_eq!(SESSION_BACKOFF.ceiling(4), Duration::from_secs(8));
        assert_eq!(SESSION_BACKOFF.ceiling(12), Duration::from_secs(30));
    }

    #[test]
    fn delay_stays_within_jitter_budget() {
        for attempt in 0..8 {
            let ceiling = RECONCILE_BACKOFF.ceiling(attempt);
            let delay = RECONCILE_BACKOFF.delay(attempt);
            assert!(delay >= ceiling);
            assert!(delay <= ceiling + ceiling / 4 + Duration::from_millis(1));
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        assert_eq!(RECONCILE_BACKOFF.ceiling(u32::MAX), Duration::from_secs(300));
    }
}
