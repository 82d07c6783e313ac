//! Error types for the entitlements module.
//!
//! Three deliberately separate blast radii:
//!
//! - [`EntitlementError`] — domain denials and enforcement failures.
//!   Callers catch these and map them to an HTTP/UI response; every
//!   variant carries the context needed to reconstruct *why*.
//! - [`EntitlementsStoreError`] — infrastructure failures of the backing
//!   store, surfaced by [`EntitlementsStoreClient`](crate::api::EntitlementsStoreClient)
//!   implementations.
//! - [`UsageError`] — usage-counting failures. An unregistered limit key
//!   is a programming error, not a domain denial, so it is not an
//!   [`EntitlementError`]; normal control flow is not expected to catch it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable machine-readable code for an [`EntitlementError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementErrorCode {
    /// Snapshot could not be resolved (not found, or confirmed absent).
    EntitlementsMissing,
    /// Snapshot present, module not in the enabled set.
    ModuleAccessDenied,
    /// Snapshot present, feature value not the literal boolean `true`.
    FeatureUnavailable,
    /// Usage reached or passed the effective limit.
    LimitExceeded,
    /// The usage count itself failed during enforcement.
    LimitCheckFailed,
}

impl EntitlementErrorCode {
    /// Wire form of the code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EntitlementsMissing => "ENTITLEMENTS_MISSING",
            Self::ModuleAccessDenied => "MODULE_ACCESS_DENIED",
            Self::FeatureUnavailable => "FEATURE_UNAVAILABLE",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
            Self::LimitCheckFailed => "LIMIT_CHECK_FAILED",
        }
    }
}

impl std::fmt::Display for EntitlementErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain error thrown by the enforcement (`require_*`) paths.
///
/// A throw is an authoritative block: enforcement never degrades into a
/// silent allow. The boolean/optional read paths return `false`/`None`
/// instead and never produce these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntitlementError {
    /// No compiled entitlements for the organization.
    ///
    /// Context is the organization only — the attempted module or feature
    /// slug is intentionally not recorded here.
    #[error("no entitlements compiled for organization {organization_id}")]
    EntitlementsMissing {
        /// Organization the lookup ran for.
        organization_id: Uuid,
    },

    /// Module is not part of the organization's plan.
    #[error("module `{module}` is not enabled for organization {organization_id} on plan `{plan_name}`")]
    ModuleAccessDenied {
        /// Organization the check ran for.
        organization_id: Uuid,
        /// Module slug that was denied.
        module: String,
        /// Plan the snapshot was compiled from.
        plan_name: String,
    },

    /// Feature is not granted by the organization's plan.
    #[error("feature `{feature}` is not available to organization {organization_id} on plan `{plan_name}`")]
    FeatureUnavailable {
        /// Organization the check ran for.
        organization_id: Uuid,
        /// Feature key that was denied.
        feature: String,
        /// Plan the snapshot was compiled from.
        plan_name: String,
    },

    /// Counted usage reached or passed the effective limit.
    #[error("limit `{limit_key}` exceeded for organization {organization_id}: {current} of {limit}")]
    LimitExceeded {
        /// Organization the check ran for.
        organization_id: Uuid,
        /// Limit key that was exceeded.
        limit_key: String,
        /// Usage counted at decision time.
        current: u64,
        /// Effective limit the usage was compared against.
        limit: i64,
    },

    /// The usage count failed during enforcement; access is refused
    /// rather than assumed to be under the limit.
    #[error("usage check for `{limit_key}` failed for organization {organization_id}")]
    LimitCheckFailed {
        /// Organization the check ran for.
        organization_id: Uuid,
        /// Limit key whose usage could not be counted.
        limit_key: String,
    },
}

impl EntitlementError {
    /// The stable code for this error.
    #[must_use]
    pub fn code(&self) -> EntitlementErrorCode {
        match self {
            Self::EntitlementsMissing { .. } => EntitlementErrorCode::EntitlementsMissing,
            Self::ModuleAccessDenied { .. } => EntitlementErrorCode::ModuleAccessDenied,
            Self::FeatureUnavailable { .. } => EntitlementErrorCode::FeatureUnavailable,
            Self::LimitExceeded { .. } => EntitlementErrorCode::LimitExceeded,
            Self::LimitCheckFailed { .. } => EntitlementErrorCode::LimitCheckFailed,
        }
    }
}

/// Infrastructure error from the entitlements backing store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntitlementsStoreError {
    /// A query was rejected or failed mid-flight.
    #[error("store query failed: {0}")]
    Query(String),

    /// The store is not reachable or not ready.
    #[error("entitlements store unavailable: {0}")]
    Unavailable(String),

    /// Unexpected implementation error.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Failure while counting usage for a limit key.
///
/// [`UnknownLimitKey`](UsageError::UnknownLimitKey) signals a key with no
/// registered strategy — misconfiguration, surfaced loudly instead of
/// being folded into the domain taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    /// No strategy registered for the limit key.
    #[error("no usage strategy registered for limit key `{0}`")]
    UnknownLimitKey(String),

    /// The underlying count or counter lookup failed.
    #[error(transparent)]
    Store(#[from] EntitlementsStoreError),
}
