//! Entitlements enforcement service.
//!
//! [`EntitlementsService`] encapsulates the full decision flow: resolve
//! the compiled snapshot (request cache or store) → read module/feature
//! grants and limits → count usage via the key's registered strategy →
//! answer, report, or refuse.
//!
//! Construct one service per inbound request. The snapshot cache inside
//! is scoped to the service and discarded with it, so entitlements are
//! read at most once per organization per request and never shared
//! across requests or tenants.
//!
//! # Read paths vs. write paths
//!
//! The boolean/optional operations (`has_*`, [`check_limit`]) are for UI
//! and read paths: they answer `false`/`None` on denial or failure and
//! never produce a domain error. The `require_*` operations are for
//! mutation paths: every denial or failure is a typed
//! [`EntitlementError`] and a counting failure is never interpreted as
//! "under the limit". The asymmetry is deliberate and load-bearing; do
//! not collapse the two shapes into one function with a flag.
//!
//! # Races
//!
//! No atomicity is provided between a limit check and the write that
//! consumes the headroom. Two concurrent writers can both pass
//! [`require_within_limit`] and jointly overshoot a cap by a small
//! margin; the compiled counters catch up afterwards.
//!
//! [`check_limit`]: EntitlementsService::check_limit
//! [`require_within_limit`]: EntitlementsService::require_within_limit

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::api::EntitlementsStoreClient;
use crate::cache::SnapshotCache;
use crate::error::{EntitlementError, UsageError};
use crate::limits::{DerivedStrategy, LimitRegistry, LimitStrategy, MeteredStrategy};
use crate::models::{
    LimitCheckResult, OrganizationEntitlements, SnapshotArg, UsageCounterQuery, UNLIMITED,
};
use crate::period::period_range;

/// Counter rows fetched per metered lookup: one winner plus room to
/// detect non-canonical duplicate period rows.
const USAGE_ROW_PROBE: u32 = 2;

/// Entitlements decision service for one request.
pub struct EntitlementsService {
    store: Arc<dyn EntitlementsStoreClient>,
    registry: Arc<LimitRegistry>,
    cache: SnapshotCache,
}

impl EntitlementsService {
    /// Create a service over a store client and a startup-built registry.
    #[must_use]
    pub fn new(store: Arc<dyn EntitlementsStoreClient>, registry: Arc<LimitRegistry>) -> Self {
        Self {
            store,
            registry,
            cache: SnapshotCache::new(),
        }
    }

    // ── Snapshot resolution ──────────────────────────────────────────

    /// Load the compiled snapshot for an organization, memoized for the
    /// lifetime of this service (one request).
    ///
    /// A store failure is logged and reported as `None`: callers treat an
    /// unresolved snapshot conservatively (no access, zero limits), so
    /// the failure mode stays closed.
    #[instrument(skip_all, fields(org = %organization_id))]
    pub async fn load_entitlements(
        &self,
        organization_id: Uuid,
    ) -> Option<Arc<OrganizationEntitlements>> {
        if let Some(cached) = self.cache.get(organization_id) {
            return cached;
        }

        let resolved = match self.store.fetch_entitlements(organization_id).await {
            Ok(row) => {
                if row.is_none() {
                    tracing::debug!(%organization_id, "no compiled entitlements row");
                }
                row.map(Arc::new)
            }
            Err(error) => {
                tracing::error!(%organization_id, %error, "entitlements load failed, treating as missing");
                None
            }
        };

        self.cache.insert(organization_id, resolved.clone());
        resolved
    }

    /// Apply the tri-state snapshot contract.
    async fn resolve(
        &self,
        organization_id: Uuid,
        snapshot: SnapshotArg,
    ) -> Option<Arc<OrganizationEntitlements>> {
        match snapshot {
            SnapshotArg::Present(snapshot) => Some(snapshot),
            SnapshotArg::Absent => None,
            SnapshotArg::NotProvided => self.load_entitlements(organization_id).await,
        }
    }

    // ── Module & feature access ──────────────────────────────────────

    /// Whether a module is enabled for the organization.
    ///
    /// An unresolved snapshot answers `false`.
    pub async fn has_module_access(
        &self,
        organization_id: Uuid,
        module: &str,
        snapshot: SnapshotArg,
    ) -> bool {
        self.resolve(organization_id, snapshot)
            .await
            .is_some_and(|entitlements| entitlements.module_enabled(module))
    }

    /// Enforcing variant of [`has_module_access`](Self::has_module_access).
    ///
    /// # Errors
    ///
    /// - [`EntitlementError::EntitlementsMissing`] if no snapshot resolves
    /// - [`EntitlementError::ModuleAccessDenied`] if the module is not enabled
    pub async fn require_module_access(
        &self,
        organization_id: Uuid,
        module: &str,
        snapshot: SnapshotArg,
    ) -> Result<(), EntitlementError> {
        let Some(entitlements) = self.resolve(organization_id, snapshot).await else {
            return Err(EntitlementError::EntitlementsMissing { organization_id });
        };
        if !entitlements.module_enabled(module) {
            return Err(EntitlementError::ModuleAccessDenied {
                organization_id,
                module: module.to_owned(),
                plan_name: entitlements.plan_name.clone(),
            });
        }
        Ok(())
    }

    /// Whether a feature is granted (strictly `true`) for the organization.
    ///
    /// An unresolved snapshot answers `false`.
    pub async fn has_feature_access(
        &self,
        organization_id: Uuid,
        feature: &str,
        snapshot: SnapshotArg,
    ) -> bool {
        self.resolve(organization_id, snapshot)
            .await
            .is_some_and(|entitlements| entitlements.feature_enabled(feature))
    }

    /// Enforcing variant of [`has_feature_access`](Self::has_feature_access).
    ///
    /// # Errors
    ///
    /// - [`EntitlementError::EntitlementsMissing`] if no snapshot resolves
    /// - [`EntitlementError::FeatureUnavailable`] if the feature is not granted
    pub async fn require_feature_access(
        &self,
        organization_id: Uuid,
        feature: &str,
        snapshot: SnapshotArg,
    ) -> Result<(), EntitlementError> {
        let Some(entitlements) = self.resolve(organization_id, snapshot).await else {
            return Err(EntitlementError::EntitlementsMissing { organization_id });
        };
        if !entitlements.feature_enabled(feature) {
            return Err(EntitlementError::FeatureUnavailable {
                organization_id,
                feature: feature.to_owned(),
                plan_name: entitlements.plan_name.clone(),
            });
        }
        Ok(())
    }

    // ── Limits ───────────────────────────────────────────────────────

    /// Effective limit for a key: the stored value verbatim (including
    /// [`UNLIMITED`]), `0` for a missing key, a non-numeric value, or an
    /// unresolved snapshot.
    pub async fn effective_limit(
        &self,
        organization_id: Uuid,
        limit_key: &str,
        snapshot: SnapshotArg,
    ) -> i64 {
        self.resolve(organization_id, snapshot)
            .await
            .map_or(0, |entitlements| entitlements.limit_value(limit_key))
    }

    /// Count current usage for a limit key via its registered strategy.
    ///
    /// # Errors
    ///
    /// - [`UsageError::UnknownLimitKey`] if the key has no strategy
    ///   (misconfiguration)
    /// - [`UsageError::Store`] if the underlying query fails
    pub async fn current_usage(
        &self,
        organization_id: Uuid,
        limit_key: &str,
    ) -> Result<u64, UsageError> {
        match self.registry.strategy(limit_key) {
            None => Err(UsageError::UnknownLimitKey(limit_key.to_owned())),
            Some(LimitStrategy::Derived(strategy)) => {
                self.derived_usage(organization_id, strategy).await
            }
            Some(LimitStrategy::Metered(strategy)) => {
                self.metered_usage(organization_id, limit_key, *strategy).await
            }
        }
    }

    async fn derived_usage(
        &self,
        organization_id: Uuid,
        strategy: &DerivedStrategy,
    ) -> Result<u64, UsageError> {
        let count = self
            .store
            .count_rows(strategy.count_query(organization_id))
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn metered_usage(
        &self,
        organization_id: Uuid,
        limit_key: &str,
        strategy: MeteredStrategy,
    ) -> Result<u64, UsageError> {
        let (period_start, period_end) = period_range(strategy.period(), Utc::now());
        let rows = self
            .store
            .usage_counters(UsageCounterQuery {
                organization_id,
                feature_key: limit_key.to_owned(),
                period_start,
                period_end,
                limit: USAGE_ROW_PROBE,
            })
            .await?;

        if rows.len() > 1 {
            tracing::warn!(
                %organization_id,
                limit_key,
                rows = rows.len(),
                "multiple usage counter rows in one period, using latest period_start"
            );
        }

        // Zero rows means no usage recorded yet, not an error.
        let Some(winner) = rows.first() else {
            return Ok(0);
        };
        Ok(winner
            .current_value
            .map_or(0, |value| u64::try_from(value).unwrap_or(0)))
    }

    /// Non-throwing limit check for UI and read paths.
    ///
    /// An unlimited key short-circuits without any usage query. Any
    /// failure while resolving or counting is logged and collapses to
    /// `None`: callers must treat `None` as "status unknown", not as
    /// "allowed".
    #[instrument(skip_all, fields(org = %organization_id, key = limit_key))]
    pub async fn check_limit(
        &self,
        organization_id: Uuid,
        limit_key: &str,
        snapshot: SnapshotArg,
    ) -> Option<LimitCheckResult> {
        let limit = self.effective_limit(organization_id, limit_key, snapshot).await;
        if limit == UNLIMITED {
            return Some(LimitCheckResult::unlimited());
        }

        match self.current_usage(organization_id, limit_key).await {
            Ok(current) => Some(LimitCheckResult::capped(limit, current)),
            Err(error) => {
                tracing::warn!(%organization_id, limit_key, %error, "limit check failed, status unknown");
                None
            }
        }
    }

    /// Fail-closed limit enforcement for write and mutation paths.
    ///
    /// An unlimited key returns immediately, without any usage query.
    ///
    /// # Errors
    ///
    /// - [`EntitlementError::LimitExceeded`] when `current >= limit`
    /// - [`EntitlementError::LimitCheckFailed`] when usage could not be
    ///   counted — the failure is never interpreted as headroom
    ///
    /// A [`LimitExceeded`](EntitlementError::LimitExceeded) raised here is
    /// never re-wrapped as `LimitCheckFailed`: only counting failures
    /// reach the wrapping arm.
    #[instrument(skip_all, fields(org = %organization_id, key = limit_key))]
    pub async fn require_within_limit(
        &self,
        organization_id: Uuid,
        limit_key: &str,
        snapshot: SnapshotArg,
    ) -> Result<(), EntitlementError> {
        let limit = self.effective_limit(organization_id, limit_key, snapshot).await;
        if limit == UNLIMITED {
            return Ok(());
        }

        let current = match self.current_usage(organization_id, limit_key).await {
            Ok(current) => current,
            Err(error) => {
                tracing::error!(%organization_id, limit_key, %error, "usage count failed during enforcement, refusing");
                return Err(EntitlementError::LimitCheckFailed {
                    organization_id,
                    limit_key: limit_key.to_owned(),
                });
            }
        };

        if current >= u64::try_from(limit).unwrap_or(0) {
            return Err(EntitlementError::LimitExceeded {
                organization_id,
                limit_key: limit_key.to_owned(),
                current,
                limit,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for EntitlementsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementsService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::error::EntitlementsStoreError;
    use crate::limits::{FilterValue, StrategyFilter};
    use crate::models::{CountQuery, FilterOp, UsageCounterRow};
    use crate::period::PeriodBoundary;

    const ORG: &str = "11111111-1111-1111-1111-111111111111";

    fn org() -> Uuid {
        Uuid::parse_str(ORG).expect("valid test UUID")
    }

    fn snapshot() -> OrganizationEntitlements {
        OrganizationEntitlements {
            organization_id: org(),
            plan_id: "plan-warehouse-pro".to_owned(),
            plan_name: "Warehouse Pro".to_owned(),
            enabled_modules: BTreeSet::from(["warehouse".to_owned(), "deliveries".to_owned()]),
            enabled_contexts: BTreeSet::from(["retail".to_owned()]),
            features: HashMap::from([
                ("labels.qr".to_owned(), json!(true)),
                ("labels.batch".to_owned(), json!(false)),
                ("labels.count".to_owned(), json!(1)),
                ("labels.stringly".to_owned(), json!("true")),
            ]),
            limits: HashMap::from([
                ("warehouse.max_locations".to_owned(), json!(50)),
                ("warehouse.max_transfers".to_owned(), json!(UNLIMITED)),
                ("warehouse.max_labels".to_owned(), json!(0)),
                ("warehouse.broken".to_owned(), json!("not a number")),
            ]),
            updated_at: Utc::now(),
        }
    }

    /// Canned store with call counters and query recording.
    #[derive(Default)]
    struct StubStore {
        entitlements: Option<OrganizationEntitlements>,
        count: Option<u64>,
        counters: Vec<UsageCounterRow>,
        fail_usage: bool,
        fail_fetch: bool,
        fetches: AtomicUsize,
        usage_queries: AtomicUsize,
        last_count_query: Mutex<Option<CountQuery>>,
        last_counter_query: Mutex<Option<UsageCounterQuery>>,
    }

    #[async_trait]
    impl EntitlementsStoreClient for StubStore {
        async fn fetch_entitlements(
            &self,
            _organization_id: Uuid,
        ) -> Result<Option<OrganizationEntitlements>, EntitlementsStoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch {
                return Err(EntitlementsStoreError::Unavailable("store down".to_owned()));
            }
            Ok(self.entitlements.clone())
        }

        async fn count_rows(
            &self,
            query: CountQuery,
        ) -> Result<Option<u64>, EntitlementsStoreError> {
            self.usage_queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_usage {
                return Err(EntitlementsStoreError::Query("count failed".to_owned()));
            }
            *self.last_count_query.lock() = Some(query);
            Ok(self.count)
        }

        async fn usage_counters(
            &self,
            query: UsageCounterQuery,
        ) -> Result<Vec<UsageCounterRow>, EntitlementsStoreError> {
            self.usage_queries.fetch_add(1, Ordering::SeqCst);
            if self.fail_usage {
                return Err(EntitlementsStoreError::Query("counter lookup failed".to_owned()));
            }
            *self.last_counter_query.lock() = Some(query);
            Ok(self.counters.clone())
        }
    }

    fn locations_registry() -> Arc<LimitRegistry> {
        Arc::new(
            LimitRegistry::new()
                .with_derived(
                    "warehouse.max_locations",
                    DerivedStrategy::new(
                        "warehouse_locations",
                        vec![
                            StrategyFilter::organization("organization_id"),
                            StrategyFilter::new(
                                "deleted_at",
                                FilterOp::Is,
                                FilterValue::Literal(json!(null)),
                            ),
                        ],
                    ),
                )
                .with_derived(
                    "warehouse.max_labels",
                    DerivedStrategy::new(
                        "warehouse_labels",
                        vec![StrategyFilter::organization("organization_id")],
                    ),
                )
                .with_derived(
                    "warehouse.max_transfers",
                    DerivedStrategy::new(
                        "warehouse_transfers",
                        vec![StrategyFilter::organization("organization_id")],
                    ),
                )
                .with_metered("api.monthly_requests", PeriodBoundary::Month)
                .with_metered("api.daily_exports", PeriodBoundary::Day),
        )
    }

    fn service(store: StubStore) -> (EntitlementsService, Arc<StubStore>) {
        let store = Arc::new(store);
        (
            EntitlementsService::new(store.clone(), locations_registry()),
            store,
        )
    }

    fn counter_row(period_start: DateTime<Utc>, current_value: Option<i64>) -> UsageCounterRow {
        UsageCounterRow {
            organization_id: org(),
            feature_key: "api.monthly_requests".to_owned(),
            period_start,
            current_value,
        }
    }

    // ── Snapshot resolution ──────────────────────────────────────────

    #[tokio::test]
    async fn present_snapshot_is_used_without_any_query() {
        let (svc, store) = service(StubStore::default());
        let arg = SnapshotArg::Present(Arc::new(snapshot()));

        assert!(svc.has_module_access(org(), "warehouse", arg).await);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn absent_snapshot_never_triggers_a_load() {
        let (svc, store) = service(StubStore {
            entitlements: Some(snapshot()),
            ..StubStore::default()
        });

        let err = svc
            .require_module_access(org(), "warehouse", SnapshotArg::Absent)
            .await
            .expect_err("absent snapshot must deny");

        assert_eq!(
            err,
            EntitlementError::EntitlementsMissing {
                organization_id: org()
            }
        );
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn not_provided_loads_once_then_hits_cache() {
        let (svc, store) = service(StubStore {
            entitlements: Some(snapshot()),
            ..StubStore::default()
        });

        assert!(svc.has_module_access(org(), "warehouse", SnapshotArg::NotProvided).await);
        assert!(svc.has_feature_access(org(), "labels.qr", SnapshotArg::NotProvided).await);

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_row_is_cached_too() {
        let (svc, store) = service(StubStore::default());

        assert!(!svc.has_module_access(org(), "warehouse", SnapshotArg::NotProvided).await);
        assert!(!svc.has_module_access(org(), "warehouse", SnapshotArg::NotProvided).await);

        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_failure_reads_as_missing() {
        let (svc, _store) = service(StubStore {
            fail_fetch: true,
            ..StubStore::default()
        });

        assert!(!svc.has_module_access(org(), "warehouse", SnapshotArg::NotProvided).await);

        let err = svc
            .require_feature_access(org(), "labels.qr", SnapshotArg::NotProvided)
            .await
            .expect_err("unresolved snapshot must deny");
        assert_eq!(err.code().as_str(), "ENTITLEMENTS_MISSING");
    }

    // ── Module access ────────────────────────────────────────────────

    #[tokio::test]
    async fn module_access_is_set_membership() {
        let (svc, _) = service(StubStore::default());
        let arg = SnapshotArg::Present(Arc::new(snapshot()));

        assert!(svc.has_module_access(org(), "warehouse", arg.clone()).await);
        assert!(!svc.has_module_access(org(), "analytics", arg).await);
    }

    #[tokio::test]
    async fn require_module_access_denial_carries_plan_context() {
        let (svc, _) = service(StubStore::default());

        let err = svc
            .require_module_access(org(), "analytics", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect_err("module is not enabled");

        assert_eq!(
            err,
            EntitlementError::ModuleAccessDenied {
                organization_id: org(),
                module: "analytics".to_owned(),
                plan_name: "Warehouse Pro".to_owned(),
            }
        );
    }

    // ── Feature access ───────────────────────────────────────────────

    #[tokio::test]
    async fn feature_access_requires_literal_true() {
        let (svc, _) = service(StubStore::default());
        let arg = SnapshotArg::Present(Arc::new(snapshot()));

        assert!(svc.has_feature_access(org(), "labels.qr", arg.clone()).await);
        assert!(!svc.has_feature_access(org(), "labels.batch", arg.clone()).await);
        assert!(!svc.has_feature_access(org(), "labels.count", arg.clone()).await);
        assert!(!svc.has_feature_access(org(), "labels.stringly", arg.clone()).await);
        assert!(!svc.has_feature_access(org(), "labels.missing", arg).await);
    }

    #[tokio::test]
    async fn require_feature_access_denial_carries_plan_context() {
        let (svc, _) = service(StubStore::default());

        let err = svc
            .require_feature_access(org(), "labels.batch", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect_err("feature is off");

        assert_eq!(
            err,
            EntitlementError::FeatureUnavailable {
                organization_id: org(),
                feature: "labels.batch".to_owned(),
                plan_name: "Warehouse Pro".to_owned(),
            }
        );
    }

    // ── Effective limit ──────────────────────────────────────────────

    #[tokio::test]
    async fn effective_limit_reads_stored_values_verbatim() {
        let (svc, _) = service(StubStore::default());
        let arg = SnapshotArg::Present(Arc::new(snapshot()));

        assert_eq!(svc.effective_limit(org(), "warehouse.max_locations", arg.clone()).await, 50);
        assert_eq!(svc.effective_limit(org(), "warehouse.max_transfers", arg.clone()).await, UNLIMITED);
        assert_eq!(svc.effective_limit(org(), "warehouse.max_labels", arg.clone()).await, 0);
        assert_eq!(svc.effective_limit(org(), "warehouse.broken", arg.clone()).await, 0);
        assert_eq!(svc.effective_limit(org(), "nonexistent.limit", arg).await, 0);
    }

    #[tokio::test]
    async fn effective_limit_without_snapshot_is_zero() {
        let (svc, _) = service(StubStore::default());

        assert_eq!(
            svc.effective_limit(org(), "warehouse.max_locations", SnapshotArg::NotProvided).await,
            0
        );
    }

    // ── Usage counting ───────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_limit_key_is_a_plain_configuration_error() {
        let (svc, _) = service(StubStore::default());

        let err = svc
            .current_usage(org(), "not.registered")
            .await
            .expect_err("key has no strategy");

        assert_eq!(err, UsageError::UnknownLimitKey("not.registered".to_owned()));
    }

    #[tokio::test]
    async fn derived_usage_binds_org_and_keeps_filter_order() {
        let (svc, store) = service(StubStore {
            count: Some(7),
            ..StubStore::default()
        });

        let current = svc
            .current_usage(org(), "warehouse.max_locations")
            .await
            .expect("count succeeds");
        assert_eq!(current, 7);

        let query = store.last_count_query.lock().clone().expect("query recorded");
        assert_eq!(query.table, "warehouse_locations");
        assert_eq!(query.filters[0].column, "organization_id");
        assert_eq!(query.filters[0].value, json!(ORG));
        assert_eq!(query.filters[1].op, FilterOp::Is);
        assert_eq!(query.filters[1].value, json!(null));
    }

    #[tokio::test]
    async fn derived_usage_null_count_defaults_to_zero() {
        let (svc, _) = service(StubStore {
            count: None,
            ..StubStore::default()
        });

        let current = svc
            .current_usage(org(), "warehouse.max_locations")
            .await
            .expect("count succeeds");
        assert_eq!(current, 0);
    }

    #[tokio::test]
    async fn metered_usage_queries_the_current_period_with_probe_limit() {
        let (svc, store) = service(StubStore::default());

        let current = svc
            .current_usage(org(), "api.monthly_requests")
            .await
            .expect("lookup succeeds");
        assert_eq!(current, 0, "zero rows means no usage yet");

        let query = store.last_counter_query.lock().clone().expect("query recorded");
        let (expected_start, expected_end) = period_range(PeriodBoundary::Month, Utc::now());
        assert_eq!(query.feature_key, "api.monthly_requests");
        assert_eq!(query.period_start, expected_start);
        assert_eq!(query.period_end, expected_end);
        assert_eq!(query.limit, 2);
    }

    #[tokio::test]
    async fn metered_usage_duplicate_rows_use_latest_period_start() {
        let (start, _) = period_range(PeriodBoundary::Month, Utc::now());
        let rows = vec![
            counter_row(start + Duration::hours(3), Some(120)),
            counter_row(start, Some(80)),
        ];
        let (svc, _) = service(StubStore {
            counters: rows,
            ..StubStore::default()
        });

        let first = svc.current_usage(org(), "api.monthly_requests").await.expect("ok");
        let second = svc.current_usage(org(), "api.monthly_requests").await.expect("ok");

        assert_eq!(first, 120, "latest period_start row wins");
        assert_eq!(second, 120, "tie-break is deterministic");
    }

    #[tokio::test]
    async fn metered_usage_null_value_defaults_to_zero() {
        let (start, _) = period_range(PeriodBoundary::Day, Utc::now());
        let (svc, _) = service(StubStore {
            counters: vec![counter_row(start, None)],
            ..StubStore::default()
        });

        let current = svc.current_usage(org(), "api.daily_exports").await.expect("ok");
        assert_eq!(current, 0);
    }

    // ── check_limit ──────────────────────────────────────────────────

    #[tokio::test]
    async fn check_limit_unlimited_short_circuits_without_usage_query() {
        let (svc, store) = service(StubStore::default());

        let result = svc
            .check_limit(org(), "warehouse.max_transfers", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect("unlimited always resolves");

        assert_eq!(result, LimitCheckResult::unlimited());
        assert_eq!(store.usage_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn check_limit_composes_limit_and_usage() {
        let (svc, _) = service(StubStore {
            count: Some(50),
            ..StubStore::default()
        });

        let result = svc
            .check_limit(org(), "warehouse.max_locations", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect("resolves");

        assert_eq!(result.limit, 50);
        assert_eq!(result.current, 50);
        assert!(!result.can_proceed);
        assert_eq!(result.percentage_used, Some(100));
    }

    #[tokio::test]
    async fn check_limit_swallows_store_failure_as_unknown() {
        let (svc, _) = service(StubStore {
            fail_usage: true,
            ..StubStore::default()
        });

        let result = svc
            .check_limit(org(), "warehouse.max_locations", SnapshotArg::Present(Arc::new(snapshot())))
            .await;

        assert_eq!(result, None, "None means unknown, not allowed");
    }

    #[tokio::test]
    async fn check_limit_swallows_unknown_key_as_unknown() {
        let mut entitlements = snapshot();
        entitlements
            .limits
            .insert("not.registered".to_owned(), json!(10));
        let (svc, _) = service(StubStore::default());

        let result = svc
            .check_limit(org(), "not.registered", SnapshotArg::Present(Arc::new(entitlements)))
            .await;

        assert_eq!(result, None);
    }

    // ── require_within_limit ─────────────────────────────────────────

    #[tokio::test]
    async fn require_within_limit_allows_headroom() {
        let (svc, _) = service(StubStore {
            count: Some(49),
            ..StubStore::default()
        });

        svc.require_within_limit(org(), "warehouse.max_locations", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect("49 of 50 fits");
    }

    #[tokio::test]
    async fn require_within_limit_unlimited_returns_without_query() {
        let (svc, store) = service(StubStore::default());

        svc.require_within_limit(org(), "warehouse.max_transfers", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect("unlimited always passes");

        assert_eq!(store.usage_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn require_within_limit_at_limit_is_exceeded() {
        let (svc, _) = service(StubStore {
            count: Some(50),
            ..StubStore::default()
        });

        let err = svc
            .require_within_limit(org(), "warehouse.max_locations", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect_err("50 of 50 does not fit");

        assert_eq!(
            err,
            EntitlementError::LimitExceeded {
                organization_id: org(),
                limit_key: "warehouse.max_locations".to_owned(),
                current: 50,
                limit: 50,
            }
        );
    }

    #[tokio::test]
    async fn require_within_limit_zero_allowance_is_exceeded_not_check_failed() {
        let (svc, _) = service(StubStore {
            count: Some(0),
            ..StubStore::default()
        });

        let err = svc
            .require_within_limit(org(), "warehouse.max_labels", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect_err("zero allowance never fits");

        assert_eq!(err.code().as_str(), "LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn require_within_limit_wraps_store_failure_as_check_failed() {
        let (svc, _) = service(StubStore {
            fail_usage: true,
            ..StubStore::default()
        });

        let err = svc
            .require_within_limit(org(), "warehouse.max_locations", SnapshotArg::Present(Arc::new(snapshot())))
            .await
            .expect_err("counting failure must refuse");

        assert_eq!(
            err,
            EntitlementError::LimitCheckFailed {
                organization_id: org(),
                limit_key: "warehouse.max_locations".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn require_within_limit_missing_snapshot_denies_with_zero_allowance() {
        let (svc, _) = service(StubStore {
            count: Some(0),
            ..StubStore::default()
        });

        let err = svc
            .require_within_limit(org(), "warehouse.max_locations", SnapshotArg::Absent)
            .await
            .expect_err("no snapshot means zero allowance");

        assert_eq!(err.code().as_str(), "LIMIT_EXCEEDED");
    }

    // ── Debug ────────────────────────────────────────────────────────

    #[test]
    fn debug_impl_hides_the_store() {
        let store: Arc<dyn EntitlementsStoreClient> = Arc::new(StubStore::default());
        let svc = EntitlementsService::new(store, Arc::new(LimitRegistry::new()));

        let rendered = format!("{svc:?}");
        assert!(rendered.contains("EntitlementsService"));
    }
}
