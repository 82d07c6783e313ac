//! Limit-key → usage-counting strategy configuration.
//!
//! Each limit key is bound to exactly one [`LimitStrategy`] in a
//! [`LimitRegistry`] built once at startup. The two strategies stay
//! separate execution paths: *derived* limits count live rows in a
//! resource table, *metered* limits read a pre-aggregated, period-bucketed
//! usage counter.

use std::collections::HashMap;

use crate::models::{CountFilter, CountQuery, FilterOp};
use crate::period::PeriodBoundary;
use uuid::Uuid;

/// Comparison value of a strategy filter, before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Placeholder substituted with the current organization id at query
    /// time.
    OrganizationId,
    /// A fixed JSON literal.
    Literal(serde_json::Value),
}

/// One unbound predicate of a derived strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFilter {
    column: String,
    op: FilterOp,
    value: FilterValue,
}

impl StrategyFilter {
    /// Create a new strategy filter.
    #[must_use]
    pub fn new(column: impl Into<String>, op: FilterOp, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Shorthand for an equality filter on the organization-id placeholder.
    #[must_use]
    pub fn organization(column: impl Into<String>) -> Self {
        Self::new(column, FilterOp::Eq, FilterValue::OrganizationId)
    }

    /// The column the predicate applies to.
    #[inline]
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The predicate operator.
    #[inline]
    #[must_use]
    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// The unbound comparison value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Bind the filter for one organization.
    #[must_use]
    pub fn bind(&self, organization_id: Uuid) -> CountFilter {
        let value = match &self.value {
            FilterValue::OrganizationId => {
                serde_json::Value::String(organization_id.to_string())
            }
            FilterValue::Literal(value) => value.clone(),
        };
        CountFilter {
            column: self.column.clone(),
            op: self.op,
            value,
        }
    }
}

/// Derived strategy: count live rows in a resource table.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedStrategy {
    table: String,
    filters: Vec<StrategyFilter>,
}

impl DerivedStrategy {
    /// Create a derived strategy over `table` with static filters.
    #[must_use]
    pub fn new(table: impl Into<String>, filters: Vec<StrategyFilter>) -> Self {
        Self {
            table: table.into(),
            filters,
        }
    }

    /// The resource table counted.
    #[inline]
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The unbound filters, in declaration order.
    #[inline]
    #[must_use]
    pub fn filters(&self) -> &[StrategyFilter] {
        &self.filters
    }

    /// Build the count-only query for one organization.
    #[must_use]
    pub fn count_query(&self, organization_id: Uuid) -> CountQuery {
        CountQuery {
            table: self.table.clone(),
            filters: self
                .filters
                .iter()
                .map(|filter| filter.bind(organization_id))
                .collect(),
        }
    }
}

/// Metered strategy: read the current period's usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeteredStrategy {
    period: PeriodBoundary,
}

impl MeteredStrategy {
    /// Create a metered strategy bucketed by `period`.
    #[must_use]
    pub fn new(period: PeriodBoundary) -> Self {
        Self { period }
    }

    /// The billing-period bucketing.
    #[inline]
    #[must_use]
    pub fn period(&self) -> PeriodBoundary {
        self.period
    }
}

/// How usage is counted for one limit key.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitStrategy {
    /// Count live rows in a resource table.
    Derived(DerivedStrategy),
    /// Read the pre-aggregated counter for the current period.
    Metered(MeteredStrategy),
}

/// Static limit-key → strategy table, built once at startup.
///
/// Registering the same key twice replaces the earlier entry (last write
/// wins); key sets are fixed per deployment, so a duplicate is a
/// programming error rather than a runtime branch.
#[derive(Debug, Clone, Default)]
pub struct LimitRegistry {
    strategies: HashMap<String, LimitStrategy>,
}

impl LimitRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a derived strategy for `limit_key`.
    #[must_use]
    pub fn with_derived(mut self, limit_key: impl Into<String>, strategy: DerivedStrategy) -> Self {
        self.strategies
            .insert(limit_key.into(), LimitStrategy::Derived(strategy));
        self
    }

    /// Register a metered strategy for `limit_key`.
    #[must_use]
    pub fn with_metered(mut self, limit_key: impl Into<String>, period: PeriodBoundary) -> Self {
        self.strategies
            .insert(limit_key.into(), LimitStrategy::Metered(MeteredStrategy::new(period)));
        self
    }

    /// Look up the strategy for a limit key.
    #[must_use]
    pub fn strategy(&self, limit_key: &str) -> Option<&LimitStrategy> {
        self.strategies.get(limit_key)
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Whether the registry has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
