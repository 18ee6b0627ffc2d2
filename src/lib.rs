//! Cloud pricing catalog sync library
//!
//! Pulls the Cloud Billing Catalog into a local SQLite database through a
//! tracked migration engine and an idempotent sync job.

pub mod catalog_source;
pub mod config;
pub mod context;
pub mod pricing_store;
pub mod sqlite_persistence;
pub mod sync;

// Re-export commonly used types for convenience
pub use catalog_source::{CatalogSource, GcpCatalogClient};
pub use context::CallContext;
pub use pricing_store::{PricingRepository, SqlitePricingStore};
pub use sqlite_persistence::Migrator;
pub use sync::{SyncJob, SyncReport};
