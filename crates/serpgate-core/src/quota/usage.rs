//! Per-tenant usage counters and their storage

use crate::error::GatewayResult;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutable usage state for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounter {
    /// Queries consumed since the last daily reset
    pub queries_today: u64,
    /// When the daily counter last reset
    pub last_query_reset: DateTime<Utc>,
    /// Credits consumed since the last monthly reset
    pub credits_used_this_month: u64,
    /// When the monthly counter last reset
    pub credits_reset_at: DateTime<Utc>,
}

impl UsageCounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            queries_today: 0,
            last_query_reset: now,
            credits_used_this_month: 0,
            credits_reset_at: now,
        }
    }

    /// Apply any pending period resets.
    ///
    /// Resets happen lazily as a side effect of access, never via a
    /// background sweep. Both boundaries are monotonic: a reset only moves
    /// the boundary timestamp forward, so each period resets at most once.
    /// Daily boundary: a UTC midnight crossed since `last_query_reset`.
    /// Monthly boundary: the first of the calendar month after
    /// `credits_reset_at`.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if now.date_naive() > self.last_query_reset.date_naive() {
            self.queries_today = 0;
            self.last_query_reset = now;
            changed = true;
        }

        if now >= next_month_start(self.credits_reset_at) {
            self.credits_used_this_month = 0;
            self.credits_reset_at = now;
            changed = true;
        }

        changed
    }
}

/// First instant of the calendar month following `t`
fn next_month_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(t)
}

/// Mutation applied atomically to a tenant's counter
pub type CounterMutation<'a> = &'a mut (dyn FnMut(&mut UsageCounter) + Send);

/// Storage for per-tenant usage counters.
///
/// `modify` must be atomic per tenant: no other mutation of the same
/// tenant's counter may interleave with the mutation closure. That is what
/// turns check-then-increment into a single conditional increment.
#[async_trait]
pub trait UsageStore: Send + Sync + fmt::Debug {
    /// Fetch a tenant's counter, if one exists
    async fn load(&self, tenant: &str) -> GatewayResult<Option<UsageCounter>>;

    /// Atomically create-or-update a tenant's counter.
    ///
    /// Missing counters are created from `default` before the mutation
    /// runs. Returns the post-mutation state.
    async fn modify(
        &self,
        tenant: &str,
        default: UsageCounter,
        mutation: CounterMutation<'_>,
    ) -> GatewayResult<UsageCounter>;
}

/// In-memory usage store keyed by tenant id
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    counters: DashMap<String, UsageCounter>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn load(&self, tenant: &str) -> GatewayResult<Option<UsageCounter>> {
        Ok(self.counters.get(tenant).map(|counter| counter.clone()))
    }

    async fn modify(
        &self,
        tenant: &str,
        default: UsageCounter,
        mutation: CounterMutation<'_>,
    ) -> GatewayResult<UsageCounter> {
        let mut entry = self
            .counters
            .entry(tenant.to_string())
            .or_insert(default);
        mutation(entry.value_mut());
        Ok(entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn same_day_does_not_reset() {
        let mut counter = UsageCounter::new(at(2024, 6, 1, 8));
        counter.queries_today = 5;
        assert!(!counter.roll_over(at(2024, 6, 1, 23)));
        assert_eq!(counter.queries_today, 5);
    }

    #[test]
    fn midnight_crossing_resets_daily_counter() {
        let mut counter = UsageCounter::new(at(2024, 6, 1, 8));
        counter.queries_today = 5;
        assert!(counter.roll_over(at(2024, 6, 2, 0)));
        assert_eq!(counter.queries_today, 0);
        assert_eq!(counter.last_query_reset, at(2024, 6, 2, 0));
    }

    #[test]
    fn two_day_gap_resets_once() {
        let mut counter = UsageCounter::new(at(2024, 6, 1, 8));
        counter.queries_today = 5;
        let now = at(2024, 6, 3, 10);
        assert!(counter.roll_over(now));
        assert_eq!(counter.queries_today, 0);
        // A second access in the same day must not reset again.
        counter.queries_today = 2;
        assert!(!counter.roll_over(at(2024, 6, 3, 12)));
        assert_eq!(counter.queries_today, 2);
    }

    #[test]
    fn monthly_boundary_is_first_of_next_month() {
        let mut counter = UsageCounter::new(at(2024, 6, 15, 8));
        counter.credits_used_this_month = 80;

        assert!(!counter.roll_over(at(2024, 6, 30, 23)));
        assert_eq!(counter.credits_used_this_month, 80);

        assert!(counter.roll_over(at(2024, 7, 1, 0)));
        assert_eq!(counter.credits_used_this_month, 0);
    }

    #[test]
    fn december_rolls_into_january() {
        let mut counter = UsageCounter::new(at(2024, 12, 20, 8));
        counter.credits_used_this_month = 10;
        assert!(counter.roll_over(at(2025, 1, 1, 0)));
        assert_eq!(counter.credits_used_this_month, 0);
    }

    #[test]
    fn resets_never_move_backward() {
        let mut counter = UsageCounter::new(at(2024, 6, 5, 8));
        // A clock reading earlier than the stored reset must not reset.
        assert!(!counter.roll_over(at(2024, 6, 4, 8)));
        assert_eq!(counter.last_query_reset, at(2024, 6, 5, 8));
    }

    #[tokio::test]
    async fn modify_creates_then_updates() {
        let store = MemoryUsageStore::new();
        let now = at(2024, 6, 1, 8);

        let counter = store
            .modify(
                "tenant-1",
                UsageCounter::new(now),
                &mut |c: &mut UsageCounter| c.queries_today += 1,
            )
            .await
            .unwrap();
        assert_eq!(counter.queries_today, 1);

        let counter = store
            .modify(
                "tenant-1",
                UsageCounter::new(now),
                &mut |c: &mut UsageCounter| c.queries_today += 1,
            )
            .await
            .unwrap();
        assert_eq!(counter.queries_today, 2);
    }
}
