//! Where the pricing catalog comes from.
//!
//! The sync job only sees the [`CatalogSource`] trait. [`GcpCatalogClient`]
//! reads the Google Cloud Billing Catalog; tests plug in scripted fakes.

mod gcp;

pub use gcp::{
    CatalogTransport, GcpCatalogClient, GcpCatalogSettings, HttpTransport, DEFAULT_CATALOG_BASE_URL,
};

use crate::context::{CallContext, Interrupted};
use crate::pricing_store::{PricingInfo, Service, Sku};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog request to {url} returned status {status}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("unexpected catalog payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("catalog at {url} returned page token {token:?} twice")]
    RepeatedPageToken { url: String, token: String },

    #[error("catalog request interrupted: {0}")]
    Interrupted(#[from] Interrupted),
}

/// SKUs of one service together with the pricing snapshots of those SKUs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSkus {
    pub skus: Vec<Sku>,
    pub pricing: Vec<PricingInfo>,
}

pub trait CatalogSource: Send + Sync {
    /// Every service of the catalog, in source order.
    fn list_services(&self, ctx: &CallContext) -> Result<Vec<Service>, CatalogError>;

    /// Every SKU of `service_id` and all their pricing snapshots.
    fn list_skus(&self, ctx: &CallContext, service_id: &str) -> Result<ServiceSkus, CatalogError>;
}
