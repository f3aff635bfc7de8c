use std::time::Duration;

use smallvec::{smallvec, SmallVec};

/// Normal closure; the peer is done with us and we should not come back.
pub const CLOSE_NORMAL: u16 = 1000;
/// Reported when the connection dropped or never opened.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Policy violation; the standard "go away" close code.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Application-range analogue of HTTP 403.
pub const CLOSE_FORBIDDEN: u16 = 4003;

/// Bounds and backoff shape for one connection session.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Reconnects allowed between two successful opens.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Multiplier applied per attempt; values below 1.0 are treated as 1.0.
    pub backoff_factor: f64,
    pub cap_delay: Duration,
    /// Close codes that mean the peer refused us; receiving one trips the breaker.
    pub rejection_codes: SmallVec<[u16; 4]>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
            cap_delay: Duration::from_millis(30_000),
            rejection_codes: smallvec![CLOSE_POLICY_VIOLATION, CLOSE_FORBIDDEN],
        }
    }
}

impl ReconnectPolicy {
    /// `min(base_delay * backoff_factor^attempts, cap_delay)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = if self.backoff_factor.is_finite() {
            self.backoff_factor.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let scaled = self.base_delay.as_secs_f64() * factor.powi(exponent);
        let cap = self.cap_delay.as_secs_f64();
        if !scaled.is_finite() || scaled >= cap {
            return self.cap_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    pub fn is_rejection(&self, code: u16) -> bool {
        self.rejection_codes.contains(&code)
    }

    /// Whether a close with `code` counts as an intentional, clean shutdown.
    pub fn is_clean(&self, code: u16) -> bool {
        code == CLOSE_NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_geometrically_until_cap() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(500),
            backoff_factor: 3.0,
            cap_delay: Duration::from_secs(10),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_500));
        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn sub_unit_factor_never_shrinks_delay() {
        let policy = ReconnectPolicy {
            backoff_factor: 0.5,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(4), policy.base_delay);
    }

    #[test]
    fn default_rejection_codes() {
        let policy = ReconnectPolicy::default();
        assert!(policy.is_rejection(CLOSE_POLICY_VIOLATION));
        assert!(policy.is_rejection(CLOSE_FORBIDDEN));
        assert!(!policy.is_rejection(CLOSE_ABNORMAL));
        assert!(policy.is_clean(CLOSE_NORMAL));
    }
}
