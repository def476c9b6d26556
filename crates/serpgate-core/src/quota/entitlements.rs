//! Plan entitlements
//!
//! Static per-tier limits and feature flags. The table is read-only
//! configuration; an unknown tier name resolves to the most restrictive
//! tier so a bad subscription record can never grant extra capacity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel meaning "no limit" for a metered allowance
pub const UNLIMITED: i64 = -1;

/// Gated product features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    CompetitorAnalysis,
    BulkExport,
    SerpTracking,
    ApiAccess,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompetitorAnalysis => "competitor_analysis",
            Self::BulkExport => "bulk_export",
            Self::SerpTracking => "serp_tracking",
            Self::ApiAccess => "api_access",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature flags attached to a tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub competitor_analysis: bool,
    pub bulk_export: bool,
    pub serp_tracking: bool,
    pub api_access: bool,
}

impl PlanFeatures {
    pub fn all() -> Self {
        Self {
            competitor_analysis: true,
            bulk_export: true,
            serp_tracking: true,
            api_access: true,
        }
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::CompetitorAnalysis => self.competitor_analysis,
            Feature::BulkExport => self.bulk_export,
            Feature::SerpTracking => self.serp_tracking,
            Feature::ApiAccess => self.api_access,
        }
    }
}

/// Limits and features for one subscription tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntitlement {
    /// Tier name as stored on the subscription record
    pub tier: String,
    /// Queries allowed per UTC day; [`UNLIMITED`] disables the limit
    pub queries_per_day: i64,
    /// Credits allowed per calendar month; [`UNLIMITED`] disables the limit
    pub monthly_credits: i64,
    /// Row cap for exports
    pub max_rows_per_export: u32,
    pub features: PlanFeatures,
}

impl PlanEntitlement {
    pub fn free() -> Self {
        Self {
            tier: "free".to_string(),
            queries_per_day: 25,
            monthly_credits: 100,
            max_rows_per_export: 100,
            features: PlanFeatures::default(),
        }
    }

    pub fn starter() -> Self {
        Self {
            tier: "starter".to_string(),
            queries_per_day: 250,
            monthly_credits: 2_000,
            max_rows_per_export: 1_000,
            features: PlanFeatures {
                competitor_analysis: true,
                ..PlanFeatures::default()
            },
        }
    }

    pub fn pro() -> Self {
        Self {
            tier: "pro".to_string(),
            queries_per_day: 1_000,
            monthly_credits: 10_000,
            max_rows_per_export: 5_000,
            features: PlanFeatures {
                competitor_analysis: true,
                bulk_export: true,
                serp_tracking: true,
                api_access: false,
            },
        }
    }

    pub fn agency() -> Self {
        Self {
            tier: "agency".to_string(),
            queries_per_day: UNLIMITED,
            monthly_credits: UNLIMITED,
            max_rows_per_export: 50_000,
            features: PlanFeatures::all(),
        }
    }
}

/// Tier name to entitlement lookup table
#[derive(Debug, Clone)]
pub struct EntitlementTable {
    tiers: HashMap<String, PlanEntitlement>,
    fallback: PlanEntitlement,
}

impl EntitlementTable {
    /// Built-in tiers: free, starter, pro, agency
    pub fn builtin() -> Self {
        let mut tiers = HashMap::new();
        for entitlement in [
            PlanEntitlement::free(),
            PlanEntitlement::starter(),
            PlanEntitlement::pro(),
            PlanEntitlement::agency(),
        ] {
            tiers.insert(entitlement.tier.clone(), entitlement);
        }
        Self {
            tiers,
            fallback: PlanEntitlement::free(),
        }
    }

    /// Add or replace a tier
    pub fn with_tier(mut self, entitlement: PlanEntitlement) -> Self {
        self.tiers.insert(entitlement.tier.clone(), entitlement);
        self
    }

    /// Resolve a tier name. Unknown names fall back to the free tier.
    pub fn lookup(&self, tier: &str) -> &PlanEntitlement {
        self.tiers.get(tier).unwrap_or(&self.fallback)
    }
}

impl Default for EntitlementTable {
    fn default() -> Self {
        Self::builtin()
    }
}
