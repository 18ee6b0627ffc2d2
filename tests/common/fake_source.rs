//! Scripted in-memory catalog

#![allow(dead_code)]

use cloud_pricing_sync::catalog_source::{CatalogError, CatalogSource, ServiceSkus};
use cloud_pricing_sync::pricing_store::{PricingInfo, Service, Sku};
use cloud_pricing_sync::CallContext;
use std::sync::Mutex;

/// Serves a fixed catalog and can be told to fail specific listings.
#[derive(Default)]
pub struct FakeCatalogSource {
    services: Vec<(Service, ServiceSkus)>,
    fail_list_services: bool,
    fail_list_skus_for: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Service, skus: Vec<(Sku, Vec<PricingInfo>)>) -> Self {
        let mut listing = ServiceSkus::default();
        for (sku, pricing) in skus {
            listing.skus.push(sku);
            listing.pricing.extend(pricing);
        }
        self.services.push((service, listing));
        self
    }

    pub fn failing_list_services(mut self) -> Self {
        self.fail_list_services = true;
        self
    }

    pub fn failing_list_skus_for(mut self, service_id: &str) -> Self {
        self.fail_list_skus_for = Some(service_id.to_string());
        self
    }

    /// Listing calls made so far, e.g. `list_services`, `list_skus:<id>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn unavailable(url: &str) -> CatalogError {
        CatalogError::Status {
            status: 503,
            url: url.to_string(),
            body: "backend unavailable".to_string(),
        }
    }
}

impl CatalogSource for FakeCatalogSource {
    fn list_services(&self, ctx: &CallContext) -> Result<Vec<Service>, CatalogError> {
        ctx.check()?;
        self.calls.lock().unwrap().push("list_services".to_string());
        if self.fail_list_services {
            return Err(Self::unavailable("fake://services"));
        }
        Ok(self.services.iter().map(|(s, _)| s.clone()).collect())
    }

    fn list_skus(&self, ctx: &CallContext, service_id: &str) -> Result<ServiceSkus, CatalogError> {
        ctx.check()?;
        self.calls
            .lock()
            .unwrap()
            .push(format!("list_skus:{}", service_id));
        if self.fail_list_skus_for.as_deref() == Some(service_id) {
            return Err(Self::unavailable(&format!("fake://services/{}/skus", service_id)));
        }
        Ok(self
            .services
            .iter()
            .find(|(s, _)| s.service_id == service_id)
            .map(|(_, listing)| listing.clone())
            .unwrap_or_default())
    }
}
