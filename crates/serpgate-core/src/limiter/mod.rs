//! Per-identifier token bucket rate limiting
//!
//! Buckets live in a process-local concurrent map keyed by identifier and
//! refill lazily on each check; nothing refills in the background. The
//! throttle is single-instance best effort: horizontally scaled deployments
//! each enforce their own limit independently.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the call may proceed
    pub allowed: bool,
    /// Whole tokens left after this check
    pub remaining: u32,
    /// When the next token becomes available. Equals the check time when
    /// the call was allowed.
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// Token bucket rate limiter keyed by identifier
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    clock: Arc<dyn Clock>,
    idle_window: Duration,
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
            idle_window: Duration::from_secs(3600),
        }
    }

    /// Set how long an untouched bucket survives before [`purge_idle`]
    /// removes it.
    ///
    /// [`purge_idle`]: RateLimiter::purge_idle
    pub fn with_idle_window(mut self, idle_window: Duration) -> Self {
        self.idle_window = idle_window;
        self
    }

    /// Check and spend one token for `identifier`.
    ///
    /// The bucket starts full on first use. Tokens accrue continuously at
    /// `refill_per_second` up to `max_tokens`; a check spends one whole
    /// token when at least one has accrued.
    pub fn check(
        &self,
        identifier: &str,
        max_tokens: u32,
        refill_per_second: f64,
    ) -> RateLimitDecision {
        let now = self.clock.now_utc();
        let rate = refill_per_second.max(f64::MIN_POSITIVE);

        let mut entry = self
            .buckets
            .entry(identifier.to_string())
            .or_insert_with(|| TokenBucket {
                tokens: max_tokens as f64,
                last_refill: now,
                last_seen: now,
            });
        let bucket = entry.value_mut();

        let elapsed = (now - bucket.last_refill)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(max_tokens as f64);
        bucket.last_refill = now;
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateLimitDecision {
                allowed: true,
                remaining: bucket.tokens.floor() as u32,
                reset_at: now,
            }
        } else {
            let wait_secs = (1.0 - bucket.tokens) / rate;
            let wait = Duration::from_secs_f64(wait_secs.min(u32::MAX as f64));
            debug!(
                identifier,
                wait_ms = wait.as_millis() as u64,
                "rate limit check denied"
            );
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: now + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::seconds(i32::MAX as i64)),
            }
        }
    }

    /// Remove buckets untouched for longer than the idle window.
    ///
    /// Returns the number of buckets removed. Intended to be called
    /// periodically by the embedding application to bound memory.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now_utc();
        let cutoff = now
            - chrono::Duration::from_std(self.idle_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(i32::MAX as i64));
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.last_seen >= cutoff);
        // Checks may insert buckets concurrently with the retain, so the
        // two lengths are not a consistent snapshot.
        let removed = before.saturating_sub(self.buckets.len());
        if removed > 0 {
            debug!(removed, "purged idle rate limit buckets");
        }
        removed
    }

    /// Number of live buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn setup() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let limiter = RateLimiter::new(clock.clone());
        (clock, limiter)
    }

    #[test]
    fn single_token_bucket_exhausts_and_refills() {
        let (clock, limiter) = setup();

        let first = limiter.check("tenant-1", 1, 1.0);
        assert!(first.allowed);
        assert_eq!(first.remaining, 0);

        let second = limiter.check("tenant-1", 1, 1.0);
        assert!(!second.allowed);
        assert!(second.reset_at > clock.now_utc());

        clock.advance(chrono::Duration::seconds(1));
        let third = limiter.check("tenant-1", 1, 1.0);
        assert!(third.allowed);
    }

    #[test]
    fn bucket_starts_full_and_caps_at_max() {
        let (clock, limiter) = setup();

        for _ in 0..5 {
            assert!(limiter.check("k", 5, 1.0).allowed);
        }
        assert!(!limiter.check("k", 5, 1.0).allowed);

        // A long idle period refills to the cap, not beyond it.
        clock.advance(chrono::Duration::seconds(3600));
        for _ in 0..5 {
            assert!(limiter.check("k", 5, 1.0).allowed);
        }
        assert!(!limiter.check("k", 5, 1.0).allowed);
    }

    #[test]
    fn identifiers_are_independent() {
        let (_clock, limiter) = setup();

        assert!(limiter.check("a", 1, 1.0).allowed);
        assert!(!limiter.check("a", 1, 1.0).allowed);
        assert!(limiter.check("b", 1, 1.0).allowed);
    }

    #[test]
    fn denied_decision_reports_reset_time() {
        let (clock, limiter) = setup();

        limiter.check("k", 1, 2.0);
        let denied = limiter.check("k", 1, 2.0);
        assert!(!denied.allowed);
        // At 2 tokens/s the next token is half a second away.
        let wait = denied.reset_at - clock.now_utc();
        assert!(wait <= chrono::Duration::milliseconds(500));
        assert!(wait > chrono::Duration::milliseconds(400));
    }

    #[test]
    fn idle_buckets_are_purged() {
        let (clock, limiter) = setup();
        let limiter = limiter.with_idle_window(Duration::from_secs(3600));

        limiter.check("old", 5, 1.0);
        clock.advance(chrono::Duration::seconds(1800));
        limiter.check("fresh", 5, 1.0);
        clock.advance(chrono::Duration::seconds(1801));

        let removed = limiter.purge_idle();
        assert_eq!(removed, 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn purge_is_safe_under_concurrent_checks() {
        let (clock, limiter) = setup();
        let limiter = Arc::new(limiter.with_idle_window(Duration::from_secs(60)));

        for i in 0..100 {
            limiter.check(&format!("idle-{i}"), 5, 1.0);
        }
        clock.advance(chrono::Duration::seconds(61));

        // Fresh buckets appear while the purge runs; the removal count
        // must stay sane regardless of the interleaving.
        std::thread::scope(|scope| {
            for t in 0..4 {
                let limiter = limiter.clone();
                scope.spawn(move || {
                    for i in 0..500 {
                        limiter.check(&format!("fresh-{t}-{i}"), 5, 1.0);
                    }
                });
            }
            for _ in 0..50 {
                limiter.purge_idle();
            }
        });

        assert_eq!(limiter.bucket_count(), 4 * 500);
    }

    #[test]
    fn fractional_accrual_survives_frequent_checks() {
        let (clock, limiter) = setup();

        limiter.check("k", 1, 1.0);
        // Denied checks 100ms apart must not discard partial accrual.
        for _ in 0..9 {
            clock.advance(chrono::Duration::milliseconds(100));
            assert!(!limiter.check("k", 1, 1.0).allowed);
        }
        clock.advance(chrono::Duration::milliseconds(200));
        assert!(limiter.check("k", 1, 1.0).allowed);
    }
}
