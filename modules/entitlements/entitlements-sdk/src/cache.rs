//! Request-scoped snapshot cache.
//!
//! Deduplicates entitlements lookups within one logical request. The
//! cache lives inside one [`EntitlementsService`](crate::EntitlementsService)
//! instance, which is constructed per request — there is no cross-request
//! sharing, no invalidation, and therefore no cross-tenant leakage path.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::OrganizationEntitlements;

/// Per-organization memo of resolved snapshots.
///
/// Negative results are cached too: "looked up and missing" is a valid
/// resolution and must not be retried within the same request.
#[derive(Debug, Default)]
pub(crate) struct SnapshotCache {
    entries: Mutex<HashMap<Uuid, Option<Arc<OrganizationEntitlements>>>>,
}

impl SnapshotCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Outer `None` means "never resolved"; inner `None` means "resolved
    /// as missing".
    pub(crate) fn get(&self, organization_id: Uuid) -> Option<Option<Arc<OrganizationEntitlements>>> {
        self.entries.lock().get(&organization_id).cloned()
    }

    pub(crate) fn insert(
        &self,
        organization_id: Uuid,
        snapshot: Option<Arc<OrganizationEntitlements>>,
    ) {
        self.entries.lock().insert(organization_id, snapshot);
    }
}
