//! Store and catalog entity fixtures

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use cloud_pricing_sync::pricing_store::{
    Category, GeoTaxonomy, Money, PricingInfo, Service, Sku, SqlitePricingStore, TieredRate,
};
use cloud_pricing_sync::{CallContext, Migrator};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A migrated pricing database in a temporary directory.
pub struct TestStore {
    pub store: Arc<SqlitePricingStore>,
    pub db_path: PathBuf,
    _temp_dir: TempDir, // Keep temp dir alive
}

impl TestStore {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("pricing.db");
        let store = SqlitePricingStore::open(
            db_path.to_str().unwrap(),
            &Migrator::embedded(),
            &CallContext::background(),
        )
        .unwrap();
        Self {
            store: Arc::new(store),
            db_path,
            _temp_dir: temp_dir,
        }
    }

    pub fn url(&self) -> &str {
        self.db_path.to_str().unwrap()
    }
}

pub fn catalog_service(service_id: &str) -> Service {
    Service {
        service_id: service_id.to_string(),
        display_name: format!("Service {}", service_id),
        business_entity_name: "businessEntities/GCP".to_string(),
    }
}

pub fn catalog_sku(sku_id: &str, service_id: &str) -> Sku {
    Sku {
        sku_id: sku_id.to_string(),
        service_id: service_id.to_string(),
        sku_name: sku_id.to_string(),
        description: format!("SKU {}", sku_id),
        category: Category {
            service_display_name: format!("Service {}", service_id),
            resource_family: "Compute".to_string(),
            resource_group: "CPU".to_string(),
            usage_type: "OnDemand".to_string(),
        },
        service_regions: vec!["us-central1".to_string()],
        geo_taxonomy: GeoTaxonomy {
            kind: "REGIONAL".to_string(),
            regions: vec!["us-central1".to_string()],
        },
    }
}

/// Fixed instant used as the effective time of most snapshots.
pub fn effective_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn pricing_snapshot(sku_id: &str, at: DateTime<Utc>, nanos: i32) -> PricingInfo {
    PricingInfo {
        sku_id: sku_id.to_string(),
        effective_time: at,
        summary: String::new(),
        currency_code: "USD".to_string(),
        usage_unit: "h".to_string(),
        usage_unit_description: "hour".to_string(),
        display_quantity: 1,
        tiered_rates: vec![TieredRate {
            start_usage_amount: 0.0,
            unit_price: Money {
                currency_code: "USD".to_string(),
                units: 0,
                nanos,
            },
        }],
    }
}
