#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Static entitlements store plugin.
//!
//! An in-memory [`EntitlementsStoreClient`](entitlements_sdk::EntitlementsStoreClient)
//! implementation whose entire contents come from static configuration.
//! Used by tests and local development; production deployments back the
//! SDK with a real database instead.

pub mod config;
pub mod store;

pub use config::{ResourceRow, StaticEntitlementsConfig};
pub use store::StaticEntitlementsStore;
