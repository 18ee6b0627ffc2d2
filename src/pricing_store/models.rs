use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog entities
// =============================================================================

/// A billing service, root of the catalog hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: String,
    pub display_name: String,
    pub business_entity_name: String,
}

/// SKU classification, stored as a JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub service_display_name: String,
    pub resource_family: String,
    pub resource_group: String,
    pub usage_type: String,
}

/// Where a SKU is offered, stored as a JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoTaxonomy {
    /// e.g. "GLOBAL", "REGIONAL", "MULTI_REGIONAL", "TYPE_UNSPECIFIED".
    #[serde(rename = "type")]
    pub kind: String,
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub sku_id: String,
    pub service_id: String,
    pub sku_name: String,
    pub description: String,
    pub category: Category,
    /// Order is preserved through the store.
    pub service_regions: Vec<String>,
    pub geo_taxonomy: GeoTaxonomy,
}

/// An amount of money: `units` whole units plus `nanos` billionths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    pub currency_code: String,
    pub units: i64,
    pub nanos: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TieredRate {
    pub start_usage_amount: f64,
    pub unit_price: Money,
}

/// A time-versioned pricing snapshot of a SKU, unique by (sku_id, effective_time).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingInfo {
    pub sku_id: String,
    pub effective_time: DateTime<Utc>,
    pub summary: String,
    pub currency_code: String,
    pub usage_unit: String,
    pub usage_unit_description: String,
    pub display_quantity: i64,
    pub tiered_rates: Vec<TieredRate>,
}

// =============================================================================
// Sync audit log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingUpdateStatus {
    Success,
    /// Not written by the sync job; aborted runs leave no audit row.
    Failure,
}

impl PricingUpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingUpdateStatus::Success => "SUCCESS",
            PricingUpdateStatus::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(PricingUpdateStatus::Success),
            "FAILURE" => Some(PricingUpdateStatus::Failure),
            _ => None,
        }
    }
}

/// One sync run, as handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdate {
    pub update_time: DateTime<Utc>,
    pub status: PricingUpdateStatus,
    pub services_updated: i64,
    pub skus_updated: i64,
    pub log_message: String,
}

/// A stored sync run with its assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingUpdateRecord {
    pub update_id: i64,
    #[serde(flatten)]
    pub update: PricingUpdate,
}

/// Tables that can be counted through [`SqlitePricingStore::count_rows`].
///
/// [`SqlitePricingStore::count_rows`]: super::SqlitePricingStore::count_rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingTable {
    Services,
    Skus,
    PricingInfo,
    PricingUpdates,
}

impl PricingTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingTable::Services => "services",
            PricingTable::Skus => "skus",
            PricingTable::PricingInfo => "pricing_info",
            PricingTable::PricingUpdates => "pricing_updates",
        }
    }
}
