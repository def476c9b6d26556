//! Credit and quota enforcement

use super::entitlements::{EntitlementTable, Feature, PlanEntitlement, UNLIMITED};
use super::usage::{UsageCounter, UsageStore};
use crate::clock::Clock;
use crate::error::{GatewayError, GatewayResult, LimitType};
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Result of an advisory quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaCheck {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// Remaining allowance after this check; `None` on unlimited plans
    /// and for feature checks
    pub remaining: Option<u64>,
}

impl QuotaCheck {
    fn denied() -> Self {
        Self {
            allowed: false,
            remaining: None,
        }
    }
}

/// Source of a tenant's subscription tier name
#[async_trait]
pub trait PlanSource: Send + Sync + fmt::Debug {
    async fn tier(&self, tenant: &str) -> GatewayResult<String>;
}

/// In-memory tenant-to-tier mapping with a default tier
#[derive(Debug)]
pub struct StaticPlanSource {
    tiers: DashMap<String, String>,
    default_tier: String,
}

impl StaticPlanSource {
    pub fn new() -> Self {
        Self {
            tiers: DashMap::new(),
            default_tier: "free".to_string(),
        }
    }

    pub fn with_default_tier(mut self, tier: impl Into<String>) -> Self {
        self.default_tier = tier.into();
        self
    }

    /// Assign a tier to a tenant
    pub fn assign(&self, tenant: impl Into<String>, tier: impl Into<String>) {
        self.tiers.insert(tenant.into(), tier.into());
    }
}

impl Default for StaticPlanSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanSource for StaticPlanSource {
    async fn tier(&self, tenant: &str) -> GatewayResult<String> {
        Ok(self
            .tiers
            .get(tenant)
            .map(|tier| tier.clone())
            .unwrap_or_else(|| self.default_tier.clone()))
    }
}

/// Enforces per-tenant query and credit allowances.
///
/// Advisory `check_*` methods never error: any failure to read the
/// tenant's entitlement or counters denies the operation (fail closed).
/// The `try_consume_*` methods are the transactional path: roll-over,
/// limit comparison, and increment happen as one atomic counter mutation,
/// so two concurrent requests cannot both pass a check before either
/// records its usage.
#[derive(Debug)]
pub struct QuotaGate {
    store: Arc<dyn UsageStore>,
    plans: Arc<dyn PlanSource>,
    entitlements: EntitlementTable,
    clock: Arc<dyn Clock>,
}

impl QuotaGate {
    pub fn new(
        store: Arc<dyn UsageStore>,
        plans: Arc<dyn PlanSource>,
        entitlements: EntitlementTable,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            plans,
            entitlements,
            clock,
        }
    }

    /// Resolve a tenant's entitlement. Unknown tiers resolve to the most
    /// restrictive tier; a failing plan source is an error (callers fail
    /// closed).
    pub async fn entitlement(&self, tenant: &str) -> GatewayResult<PlanEntitlement> {
        let tier = self.plans.tier(tenant).await?;
        Ok(self.entitlements.lookup(&tier).clone())
    }

    /// Advisory daily-query check. Applies any pending lazy reset as a
    /// side effect.
    pub async fn check_query_limit(&self, tenant: &str) -> QuotaCheck {
        match self.query_headroom(tenant).await {
            Ok(check) => check,
            Err(err) => {
                warn!(tenant, error = %err, "query limit check failed, failing closed");
                QuotaCheck::denied()
            }
        }
    }

    /// Advisory credit check for an operation costing `required` credits.
    pub async fn check_credit_limit(&self, tenant: &str, required: u64) -> QuotaCheck {
        match self.credit_headroom(tenant, required).await {
            Ok(check) => check,
            Err(err) => {
                warn!(tenant, error = %err, "credit limit check failed, failing closed");
                QuotaCheck::denied()
            }
        }
    }

    /// Whether the tenant's plan includes `feature`. Fails closed.
    pub async fn check_feature_access(&self, tenant: &str, feature: Feature) -> QuotaCheck {
        match self.entitlement(tenant).await {
            Ok(entitlement) => QuotaCheck {
                allowed: entitlement.features.is_enabled(feature),
                remaining: None,
            },
            Err(err) => {
                warn!(tenant, error = %err, "feature check failed, failing closed");
                QuotaCheck::denied()
            }
        }
    }

    /// Like [`check_feature_access`] but with a typed error for the
    /// rejection path.
    ///
    /// [`check_feature_access`]: QuotaGate::check_feature_access
    pub async fn require_feature(&self, tenant: &str, feature: Feature) -> GatewayResult<()> {
        let entitlement = self.entitlement(tenant).await?;
        if entitlement.features.is_enabled(feature) {
            Ok(())
        } else {
            Err(GatewayError::feature_disabled(feature.as_str()))
        }
    }

    /// Atomically consume one daily query.
    ///
    /// Roll-over, comparison, and increment run as a single counter
    /// mutation. Rejections carry the typed quota error; store failures
    /// propagate (fail closed).
    pub async fn try_consume_query(&self, tenant: &str) -> GatewayResult<QuotaCheck> {
        let entitlement = self.entitlement(tenant).await?;
        let now = self.clock.now_utc();

        if entitlement.queries_per_day == UNLIMITED {
            self.store
                .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                    c.roll_over(now);
                    c.queries_today += 1;
                })
                .await?;
            return Ok(QuotaCheck {
                allowed: true,
                remaining: None,
            });
        }

        let limit = entitlement.queries_per_day as u64;
        let mut consumed = false;
        let counter = self
            .store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
                if c.queries_today < limit {
                    c.queries_today += 1;
                    consumed = true;
                }
            })
            .await?;

        if consumed {
            Ok(QuotaCheck {
                allowed: true,
                remaining: Some(limit - counter.queries_today),
            })
        } else {
            Err(GatewayError::quota_exceeded(
                LimitType::QueriesPerDay,
                counter.queries_today,
                limit,
            ))
        }
    }

    /// Atomically consume `credits` from the monthly allowance.
    pub async fn try_consume_credits(&self, tenant: &str, credits: u64) -> GatewayResult<QuotaCheck> {
        let entitlement = self.entitlement(tenant).await?;
        let now = self.clock.now_utc();

        if entitlement.monthly_credits == UNLIMITED {
            self.store
                .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                    c.roll_over(now);
                    c.credits_used_this_month += credits;
                })
                .await?;
            return Ok(QuotaCheck {
                allowed: true,
                remaining: None,
            });
        }

        let limit = entitlement.monthly_credits as u64;
        let mut consumed = false;
        let counter = self
            .store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
                if c.credits_used_this_month + credits <= limit {
                    c.credits_used_this_month += credits;
                    consumed = true;
                }
            })
            .await?;

        if consumed {
            Ok(QuotaCheck {
                allowed: true,
                remaining: Some(limit - counter.credits_used_this_month),
            })
        } else {
            Err(GatewayError::quota_exceeded(
                LimitType::MonthlyCredits,
                counter.credits_used_this_month,
                limit,
            ))
        }
    }

    /// Return one previously consumed query (provider call failed after
    /// the quota was taken). A refund landing after a period boundary
    /// applies the pending reset first rather than crediting the new
    /// period for old usage.
    pub async fn refund_query(&self, tenant: &str) -> GatewayResult<()> {
        let now = self.clock.now_utc();
        self.store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
                c.queries_today = c.queries_today.saturating_sub(1);
            })
            .await?;
        Ok(())
    }

    /// Return previously consumed credits.
    pub async fn refund_credits(&self, tenant: &str, credits: u64) -> GatewayResult<()> {
        let now = self.clock.now_utc();
        self.store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
                c.credits_used_this_month = c.credits_used_this_month.saturating_sub(credits);
            })
            .await?;
        Ok(())
    }

    /// Record one query after the fact, without a limit check. For
    /// callers metering an operation that already succeeded.
    pub async fn increment_query_count(&self, tenant: &str) -> GatewayResult<()> {
        let now = self.clock.now_utc();
        self.store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
                c.queries_today += 1;
            })
            .await?;
        Ok(())
    }

    /// Record credit usage after the fact, without a limit check.
    pub async fn increment_credit_usage(&self, tenant: &str, credits: u64) -> GatewayResult<()> {
        let now = self.clock.now_utc();
        self.store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
                c.credits_used_this_month += credits;
            })
            .await?;
        Ok(())
    }

    async fn query_headroom(&self, tenant: &str) -> GatewayResult<QuotaCheck> {
        let entitlement = self.entitlement(tenant).await?;
        if entitlement.queries_per_day == UNLIMITED {
            return Ok(QuotaCheck {
                allowed: true,
                remaining: None,
            });
        }

        let limit = entitlement.queries_per_day as u64;
        let now = self.clock.now_utc();
        // The lazy reset persists as a side effect of the check itself.
        let counter = self
            .store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
            })
            .await?;

        Ok(QuotaCheck {
            allowed: counter.queries_today < limit,
            remaining: Some(limit.saturating_sub(counter.queries_today)),
        })
    }

    async fn credit_headroom(&self, tenant: &str, required: u64) -> GatewayResult<QuotaCheck> {
        let entitlement = self.entitlement(tenant).await?;
        if entitlement.monthly_credits == UNLIMITED {
            return Ok(QuotaCheck {
                allowed: true,
                remaining: None,
            });
        }

        let limit = entitlement.monthly_credits as u64;
        let now = self.clock.now_utc();
        let counter = self
            .store
            .modify(tenant, UsageCounter::new(now), &mut |c: &mut UsageCounter| {
                c.roll_over(now);
            })
            .await?;

        Ok(QuotaCheck {
            allowed: counter.credits_used_this_month + required <= limit,
            remaining: Some(limit.saturating_sub(counter.credits_used_this_month)),
        })
    }
}
