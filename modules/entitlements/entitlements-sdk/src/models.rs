//! Domain models for the entitlements module.
//!
//! The central record is [`OrganizationEntitlements`] — the compiled,
//! per-organization snapshot of enabled modules, feature flags and plan
//! limits. It is materialized by an external compilation process and is
//! strictly read-only here: once loaded, a snapshot is never mutated for
//! the remainder of a decision.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel limit value meaning "no cap applies".
pub const UNLIMITED: i64 = -1;

/// Compiled entitlements snapshot for one organization.
///
/// One row per organization. `features` and `limits` are open property
/// bags: plans evolve without the SDK having to enumerate every key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationEntitlements {
    /// Tenant identifier the snapshot was compiled for.
    pub organization_id: Uuid,
    /// Subscription plan identifier (diagnostics only).
    pub plan_id: String,
    /// Human-readable plan name, carried into denial errors.
    pub plan_name: String,
    /// Module slugs the organization may use.
    #[serde(default)]
    pub enabled_modules: BTreeSet<String>,
    /// Business-context slugs compiled for the organization.
    #[serde(default)]
    pub enabled_contexts: BTreeSet<String>,
    /// Feature key → stored value. Only the literal boolean `true` grants.
    #[serde(default)]
    pub features: HashMap<String, serde_json::Value>,
    /// Limit key → stored value. `-1` means unlimited; a missing or
    /// non-numeric value resolves to `0` (deny by default).
    #[serde(default)]
    pub limits: HashMap<String, serde_json::Value>,
    /// When the snapshot was last compiled (diagnostics only).
    pub updated_at: DateTime<Utc>,
}

impl OrganizationEntitlements {
    /// Whether a module slug is in the enabled set.
    #[must_use]
    pub fn module_enabled(&self, module: &str) -> bool {
        self.enabled_modules.contains(module)
    }

    /// Whether a business-context slug was compiled for the organization.
    #[must_use]
    pub fn has_context(&self, context: &str) -> bool {
        self.enabled_contexts.contains(context)
    }

    /// Strict feature gate: grants only for the stored boolean `true`.
    ///
    /// Truthy-but-not-boolean values (`1`, `"true"`) deny, as does a
    /// missing key.
    #[must_use]
    pub fn feature_enabled(&self, feature: &str) -> bool {
        matches!(self.features.get(feature), Some(serde_json::Value::Bool(true)))
    }

    /// Raw limit for a key: the stored value verbatim when it is an
    /// integer (including [`UNLIMITED`] and an explicit `0`), else `0`.
    #[must_use]
    pub fn limit_value(&self, limit_key: &str) -> i64 {
        self.limits
            .get(limit_key)
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0)
    }
}

/// Caller-supplied snapshot argument, threaded through every decision
/// function.
///
/// The three states are distinct on purpose:
///
/// - [`NotProvided`](SnapshotArg::NotProvided) — the service resolves the
///   snapshot itself (request cache, then store).
/// - [`Absent`](SnapshotArg::Absent) — the caller already looked the
///   organization up and confirmed there is no snapshot; the service must
///   NOT load again.
/// - [`Present`](SnapshotArg::Present) — request-scoped reuse across
///   several checks; zero queries.
#[derive(Debug, Clone, Default)]
pub enum SnapshotArg {
    /// Not yet looked up; resolve via cache or store.
    #[default]
    NotProvided,
    /// Looked up and confirmed missing; never triggers a load.
    Absent,
    /// Use this snapshot verbatim.
    Present(Arc<OrganizationEntitlements>),
}

impl From<Arc<OrganizationEntitlements>> for SnapshotArg {
    fn from(snapshot: Arc<OrganizationEntitlements>) -> Self {
        Self::Present(snapshot)
    }
}

impl From<Option<Arc<OrganizationEntitlements>>> for SnapshotArg {
    /// `Some` → [`SnapshotArg::Present`], `None` → [`SnapshotArg::Absent`].
    ///
    /// An `Option` already encodes a completed lookup, so `None` maps to
    /// "confirmed missing", not "not yet looked up".
    fn from(snapshot: Option<Arc<OrganizationEntitlements>>) -> Self {
        match snapshot {
            Some(snapshot) => Self::Present(snapshot),
            None => Self::Absent,
        }
    }
}

/// Outcome of a non-throwing limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitCheckResult {
    /// Effective limit; [`UNLIMITED`] when no cap applies.
    pub limit: i64,
    /// Usage counted against the limit. Reported as `0` for unlimited.
    pub current: u64,
    /// Whether one more unit of usage fits under the limit.
    pub can_proceed: bool,
    /// `round(current / limit * 100)`, uncapped (can exceed 100).
    /// `None` for unlimited; `Some(0)` for a zero limit.
    pub percentage_used: Option<u32>,
}

impl LimitCheckResult {
    /// Result for an unlimited key: always proceeds, no usage counted.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            limit: UNLIMITED,
            current: 0,
            can_proceed: true,
            percentage_used: None,
        }
    }

    /// Result for a capped key (`limit >= 0`).
    ///
    /// A zero limit reports `percentage_used = Some(0)` — never a NaN or
    /// infinity from the division.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn capped(limit: i64, current: u64) -> Self {
        let cap = u64::try_from(limit).unwrap_or(0);
        let percentage_used = if limit > 0 {
            Some((current as f64 / limit as f64 * 100.0).round() as u32)
        } else {
            Some(0)
        };
        Self {
            limit,
            current,
            can_proceed: current < cap,
            percentage_used,
        }
    }

    /// How much headroom is left. `None` for unlimited.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        if self.limit == UNLIMITED {
            return None;
        }
        let cap = u64::try_from(self.limit).unwrap_or(0);
        Some(cap.saturating_sub(self.current))
    }
}

/// Filter operator supported by the count-only query interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    /// `column = value`
    Eq,
    /// `column <> value`
    Neq,
    /// `column IS value` (identity match; `value` is typically `null`,
    /// `true` or `false`)
    Is,
}

/// One bound predicate of a count-only query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountFilter {
    /// Column the predicate applies to.
    pub column: String,
    /// Predicate operator.
    pub op: FilterOp,
    /// Bound comparison value (org-id placeholders already substituted).
    pub value: serde_json::Value,
}

/// Count-only query over a named resource table. No row data is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountQuery {
    /// Resource table to count in.
    pub table: String,
    /// Predicates, applied in declaration order (AND semantics).
    pub filters: Vec<CountFilter>,
}

/// Ranged lookup against the usage-counter store.
///
/// The store must return rows matching `(organization_id, feature_key)`
/// with `period_start` in `[period_start, period_end)`, ordered by
/// `period_start` descending, at most `limit` rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounterQuery {
    /// Organization the counter belongs to.
    pub organization_id: Uuid,
    /// Counter key; the limit key doubles as the feature key.
    pub feature_key: String,
    /// Inclusive lower bound of the billing period.
    pub period_start: DateTime<Utc>,
    /// Exclusive upper bound of the billing period.
    pub period_end: DateTime<Utc>,
    /// Maximum rows to return.
    pub limit: u32,
}

/// One pre-aggregated usage counter row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounterRow {
    /// Organization the counter belongs to.
    pub organization_id: Uuid,
    /// Counter key.
    pub feature_key: String,
    /// Start of the billing period this counter covers.
    pub period_start: DateTime<Utc>,
    /// Aggregated usage; `None` reads as zero.
    pub current_value: Option<i64>,
}
