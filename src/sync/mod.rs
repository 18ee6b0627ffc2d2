//! Full reconciliation of the catalog into the pricing store.

mod periodic;

pub use periodic::run_periodically;

use crate::catalog_source::{CatalogError, CatalogSource};
use crate::context::{CallContext, Interrupted};
use crate::pricing_store::{PricingRepository, PricingUpdate, PricingUpdateStatus, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

pub const SYNC_COMPLETED_MESSAGE: &str = "sync completed";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list catalog services: {0}")]
    ListServices(#[source] CatalogError),

    #[error("failed to list SKUs of service {service_id}: {source}")]
    ListSkus {
        service_id: String,
        #[source]
        source: CatalogError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sync interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Id of the audit row written for this pass.
    pub update_id: i64,
    pub services_updated: i64,
    pub skus_updated: i64,
    pub pricing_entries_updated: i64,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    services: i64,
    skus: i64,
    pricing_entries: i64,
}

pub struct SyncJob {
    source: Arc<dyn CatalogSource>,
    repository: Arc<dyn PricingRepository>,
}

impl SyncJob {
    pub fn new(source: Arc<dyn CatalogSource>, repository: Arc<dyn PricingRepository>) -> Self {
        Self { source, repository }
    }

    /// Pull the whole catalog and upsert it, then append a SUCCESS audit row.
    ///
    /// Stops at the first failure. Rows written before the failure stay
    /// committed and no audit row is written for the aborted pass.
    pub fn run(&self, ctx: &CallContext) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut counters = Counters::default();
        info!("Starting pricing sync");

        if let Err(e) = self.sync_catalog(ctx, &mut counters) {
            error!(
                "Pricing sync aborted after {} service(s), {} SKU(s), {} pricing entries: {}",
                counters.services, counters.skus, counters.pricing_entries, e
            );
            return Err(e);
        }

        let update = PricingUpdate {
            update_time: Utc::now(),
            status: PricingUpdateStatus::Success,
            services_updated: counters.services,
            skus_updated: counters.skus,
            log_message: SYNC_COMPLETED_MESSAGE.to_string(),
        };
        let update_id = self.repository.insert_pricing_update(ctx, &update)?;

        let report = SyncReport {
            update_id,
            services_updated: counters.services,
            skus_updated: counters.skus,
            pricing_entries_updated: counters.pricing_entries,
            elapsed: started.elapsed(),
        };
        info!(
            "Pricing sync completed in {:?}: {} service(s), {} SKU(s), {} pricing entries",
            report.elapsed,
            report.services_updated,
            report.skus_updated,
            report.pricing_entries_updated
        );
        Ok(report)
    }

    fn sync_catalog(&self, ctx: &CallContext, counters: &mut Counters) -> Result<(), SyncError> {
        let services = self
            .source
            .list_services(ctx)
            .map_err(SyncError::ListServices)?;
        debug!("Catalog lists {} service(s)", services.len());

        for service in &services {
            ctx.check()?;
            self.repository.upsert_service(ctx, service)?;
            counters.services += 1;

            let listing = self
                .source
                .list_skus(ctx, &service.service_id)
                .map_err(|source| SyncError::ListSkus {
                    service_id: service.service_id.clone(),
                    source,
                })?;

            for sku in &listing.skus {
                self.repository.upsert_sku(ctx, sku)?;
                counters.skus += 1;
            }
            for info in &listing.pricing {
                self.repository.upsert_pricing_info(ctx, info)?;
                counters.pricing_entries += 1;
            }
            debug!(
                "Synced service {} ({} SKU(s), {} pricing entries)",
                service.service_id,
                listing.skus.len(),
                listing.pricing.len()
            );
        }
        ctx.check()?;
        Ok(())
    }
}
