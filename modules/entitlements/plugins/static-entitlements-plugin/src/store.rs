//! Store implementation for the static entitlements plugin.

use async_trait::async_trait;
use entitlements_sdk::{
    CountFilter, CountQuery, EntitlementsStoreClient, EntitlementsStoreError, FilterOp,
    OrganizationEntitlements, UsageCounterQuery, UsageCounterRow,
};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::config::{ResourceRow, StaticEntitlementsConfig};

/// In-memory entitlements store backed by static configuration.
///
/// Implements the full [`EntitlementsStoreClient`] surface: snapshot
/// point lookup, count-only queries with `eq`/`neq`/`is` predicate
/// evaluation, and ranged, descending-ordered usage-counter lookups.
/// The mutators exist so tests can evolve store contents mid-scenario;
/// production deployments use a real backend instead.
pub struct StaticEntitlementsStore {
    state: RwLock<StaticEntitlementsConfig>,
}

impl StaticEntitlementsStore {
    /// Create a store from static configuration.
    #[must_use]
    pub fn new(config: StaticEntitlementsConfig) -> Self {
        Self {
            state: RwLock::new(config),
        }
    }

    /// Replace or add one organization's snapshot.
    pub fn upsert_organization(&self, entitlements: OrganizationEntitlements) {
        let mut state = self.state.write();
        if let Some(existing) = state
            .organizations
            .iter_mut()
            .find(|row| row.organization_id == entitlements.organization_id)
        {
            *existing = entitlements;
        } else {
            state.organizations.push(entitlements);
        }
    }

    /// Append a row to a resource table, creating the table on first use.
    pub fn push_resource_row(&self, table: impl Into<String>, row: ResourceRow) {
        self.state.write().resources.entry(table.into()).or_default().push(row);
    }

    /// Append a usage counter row.
    pub fn push_usage_counter(&self, row: UsageCounterRow) {
        self.state.write().usage_counters.push(row);
    }
}

impl Default for StaticEntitlementsStore {
    fn default() -> Self {
        Self::new(StaticEntitlementsConfig::default())
    }
}

/// SQL-style predicate evaluation over a stored JSON value.
///
/// `eq`/`neq` follow three-valued comparison semantics: a `null` on
/// either side matches nothing. `is` is an identity match and is how
/// `null` (and booleans) are tested for.
fn filter_matches(row: &ResourceRow, filter: &CountFilter) -> bool {
    let stored = row.get(&filter.column).unwrap_or(&serde_json::Value::Null);
    match filter.op {
        FilterOp::Eq => {
            !stored.is_null() && !filter.value.is_null() && *stored == filter.value
        }
        FilterOp::Neq => {
            !stored.is_null() && !filter.value.is_null() && *stored != filter.value
        }
        FilterOp::Is => *stored == filter.value,
    }
}

#[async_trait]
impl EntitlementsStoreClient for StaticEntitlementsStore {
    async fn fetch_entitlements(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<OrganizationEntitlements>, EntitlementsStoreError> {
        let state = self.state.read();
        Ok(state
            .organizations
            .iter()
            .find(|row| row.organization_id == organization_id)
            .cloned())
    }

    async fn count_rows(&self, query: CountQuery) -> Result<Option<u64>, EntitlementsStoreError> {
        let state = self.state.read();
        let Some(rows) = state.resources.get(&query.table) else {
            tracing::debug!(table = %query.table, "counting over an undeclared table");
            return Ok(Some(0));
        };
        let count = rows
            .iter()
            .filter(|row| query.filters.iter().all(|filter| filter_matches(row, filter)))
            .count() as u64;
        Ok(Some(count))
    }

    async fn usage_counters(
        &self,
        query: UsageCounterQuery,
    ) -> Result<Vec<UsageCounterRow>, EntitlementsStoreError> {
        let state = self.state.read();
        let mut rows: Vec<UsageCounterRow> = state
            .usage_counters
            .iter()
            .filter(|row| {
                row.organization_id == query.organization_id
                    && row.feature_key == query.feature_key
                    && row.period_start >= query.period_start
                    && row.period_start < query.period_end
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        rows.truncate(query.limit as usize);
        Ok(rows)
    }
}
