//! Storage client trait for the entitlements module.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::EntitlementsStoreError;
use crate::models::{CountQuery, OrganizationEntitlements, UsageCounterQuery, UsageCounterRow};

/// Backing-store interface consumed by the entitlements service.
///
/// The three operations are the full storage surface of the module: a
/// point lookup of the compiled snapshot, a count-only query over an
/// arbitrary resource table, and a small ranged lookup over the
/// usage-counter store. Persistence of the entitlements themselves is an
/// external compilation process — implementations never write through
/// this trait.
#[async_trait]
pub trait EntitlementsStoreClient: Send + Sync {
    /// Fetch the compiled entitlements row for one organization.
    ///
    /// Returns `Ok(None)` when no row has been compiled for the
    /// organization — that is an expected state, not an error.
    ///
    /// # Errors
    ///
    /// - `Query` if the lookup was rejected or failed mid-flight
    /// - `Unavailable` if the store is not reachable
    /// - `Internal` for unexpected implementation errors
    async fn fetch_entitlements(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<OrganizationEntitlements>, EntitlementsStoreError>;

    /// Execute a count-only query. No row data is fetched.
    ///
    /// `Ok(None)` models a backend that reports "no count available";
    /// callers treat it as zero.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`fetch_entitlements`](Self::fetch_entitlements).
    async fn count_rows(&self, query: CountQuery) -> Result<Option<u64>, EntitlementsStoreError>;

    /// Look up usage counters for one organization, key and period range.
    ///
    /// Implementations must return rows ordered by `period_start`
    /// descending and return at most `query.limit` rows; the service
    /// relies on this ordering for its duplicate-row tie-break.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`fetch_entitlements`](Self::fetch_entitlements).
    async fn usage_counters(
        &self,
        query: UsageCounterQuery,
    ) -> Result<Vec<UsageCounterRow>, EntitlementsStoreError>;
}
