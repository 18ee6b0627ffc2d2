mod error;
mod models;
mod schema;
mod sqlite_pricing_store;

pub use error::StoreError;
pub use models::*;
pub use schema::{validate_schema, PRICING_TABLES};
pub use sqlite_pricing_store::SqlitePricingStore;

use crate::context::CallContext;

/// Idempotent writes of catalog entities plus the append-only audit log.
///
/// Each call is its own unit of work: nothing ties the writes of one sync run
/// together, so an aborted run leaves its earlier writes in place.
pub trait PricingRepository: Send + Sync {
    /// Insert the service or overwrite its names.
    fn upsert_service(&self, ctx: &CallContext, service: &Service) -> Result<(), StoreError>;

    /// Insert the SKU or overwrite every field but its id. The owning service
    /// must already exist.
    fn upsert_sku(&self, ctx: &CallContext, sku: &Sku) -> Result<(), StoreError>;

    /// Insert or overwrite the snapshot keyed by (sku_id, effective_time).
    fn upsert_pricing_info(&self, ctx: &CallContext, info: &PricingInfo) -> Result<(), StoreError>;

    /// Append an audit row and return its id.
    fn insert_pricing_update(
        &self,
        ctx: &CallContext,
        update: &PricingUpdate,
    ) -> Result<i64, StoreError>;
}
