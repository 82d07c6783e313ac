//! Configuration for the static entitlements store plugin.

use std::collections::HashMap;

use entitlements_sdk::{OrganizationEntitlements, UsageCounterRow};
use serde::Deserialize;

/// One resource row: column name → stored JSON value.
pub type ResourceRow = HashMap<String, serde_json::Value>;

/// Plugin configuration: the entire store contents, declared statically.
///
/// Suited to development environments and tests; nothing here is ever
/// compiled from billing state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticEntitlementsConfig {
    /// Compiled entitlements snapshots, one per organization.
    pub organizations: Vec<OrganizationEntitlements>,

    /// Resource tables for derived limit counting: table name → rows.
    pub resources: HashMap<String, Vec<ResourceRow>>,

    /// Pre-aggregated usage counters for metered limit lookup.
    pub usage_counters: Vec<UsageCounterRow>,
}
