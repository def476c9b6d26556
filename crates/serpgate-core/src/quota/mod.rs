//! Plan entitlements, usage counters, and quota enforcement
//!
//! Three layers: the static entitlement table (what a tier allows), the
//! usage store (what a tenant has consumed), and the gate that compares
//! the two. Period resets are lazy and monotonic; consumption is an
//! atomic conditional increment, never check-then-set.

pub mod entitlements;
pub mod gate;
pub mod usage;

pub use entitlements::{
    EntitlementTable, Feature, PlanEntitlement, PlanFeatures, UNLIMITED,
};
pub use gate::{PlanSource, QuotaCheck, QuotaGate, StaticPlanSource};
pub use usage::{CounterMutation, MemoryUsageStore, UsageCounter, UsageStore};
