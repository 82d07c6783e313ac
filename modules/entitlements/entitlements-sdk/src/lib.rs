#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Entitlements SDK
//!
//! This crate provides the public API for the `entitlements` module:
//!
//! - [`EntitlementsService`] - Decision service: module/feature access and plan-limit checks
//! - [`EntitlementsStoreClient`] - Storage client trait for implementations
//! - [`OrganizationEntitlements`], [`SnapshotArg`], [`LimitCheckResult`] - Snapshot models
//! - [`LimitRegistry`], [`LimitStrategy`] - Limit-key → counting-strategy configuration
//! - [`EntitlementError`], [`EntitlementErrorCode`] - Error types
//! - [`period`] - UTC billing-period boundary helpers
//!
//! ## Usage
//!
//! ```ignore
//! use entitlements_sdk::{EntitlementsService, SnapshotArg};
//!
//! // One service per inbound request; store and registry are long-lived.
//! let svc = EntitlementsService::new(store.clone(), registry.clone());
//!
//! // Gate a mutation (fail-closed):
//! svc.require_module_access(org_id, "warehouse", SnapshotArg::NotProvided).await?;
//! svc.require_within_limit(org_id, "warehouse.max_locations", SnapshotArg::NotProvided).await?;
//!
//! // Render a usage meter (non-throwing; None = status unknown):
//! let status = svc.check_limit(org_id, "warehouse.max_locations", SnapshotArg::NotProvided).await;
//! ```

pub mod api;
mod cache;
pub mod enforcer;
pub mod error;
pub mod limits;
pub mod models;
pub mod period;

// Re-export main types at crate root
pub use api::EntitlementsStoreClient;
pub use enforcer::EntitlementsService;
pub use error::{EntitlementError, EntitlementErrorCode, EntitlementsStoreError, UsageError};
pub use limits::{
    DerivedStrategy, FilterValue, LimitRegistry, LimitStrategy, MeteredStrategy, StrategyFilter,
};
pub use models::{
    CountFilter, CountQuery, FilterOp, LimitCheckResult, OrganizationEntitlements, SnapshotArg,
    UsageCounterQuery, UsageCounterRow, UNLIMITED,
};
pub use period::{period_range, PeriodBoundary};
