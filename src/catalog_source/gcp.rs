//! Google Cloud Billing Catalog client over the public REST API.
//!
//! Listing endpoints are paginated: every response may carry a
//! `nextPageToken`, which is sent back as `pageToken` until it comes back
//! empty.

use super::{CatalogError, CatalogSource, ServiceSkus};
use crate::context::CallContext;
use crate::pricing_store::{
    Category, GeoTaxonomy, Money, PricingInfo, Service, Sku, TieredRate,
};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://cloudbilling.googleapis.com/v1";
const USER_AGENT: &str = concat!(
    "pricing-sync/",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ")"
);

/// Fetches one page of a listing endpoint and returns the raw body.
pub trait CatalogTransport: Send + Sync {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<String, CatalogError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl CatalogTransport for HttpTransport {
    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<String, CatalogError> {
        let mut request = self.client.get(url).query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(response.text()?)
    }
}

#[derive(Debug, Clone)]
pub struct GcpCatalogSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub page_size: Option<u32>,
    /// ISO 4217 code the prices are converted to; the API defaults to USD.
    pub currency_code: Option<String>,
}

impl Default for GcpCatalogSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            api_key: None,
            page_size: None,
            currency_code: None,
        }
    }
}

pub struct GcpCatalogClient {
    transport: Box<dyn CatalogTransport>,
    settings: GcpCatalogSettings,
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ListServicesResponse {
    services: Vec<WireService>,
    next_page_token: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireService {
    name: String,
    display_name: String,
    business_entity_name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ListSkusResponse {
    skus: Vec<WireSku>,
    next_page_token: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireSku {
    name: String,
    sku_id: String,
    description: String,
    category: WireCategory,
    service_regions: Vec<String>,
    pricing_info: Vec<WirePricingInfo>,
    geo_taxonomy: Option<WireGeoTaxonomy>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireCategory {
    service_display_name: String,
    resource_family: String,
    resource_group: String,
    usage_type: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireGeoTaxonomy {
    #[serde(rename = "type")]
    kind: Option<String>,
    regions: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WirePricingInfo {
    summary: String,
    pricing_expression: WirePricingExpression,
    effective_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WirePricingExpression {
    usage_unit: String,
    usage_unit_description: String,
    display_quantity: f64,
    tiered_rates: Vec<WireTieredRate>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireTieredRate {
    start_usage_amount: f64,
    unit_price: WireMoney,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WireMoney {
    currency_code: String,
    #[serde(deserialize_with = "int64_from_string_or_number")]
    units: i64,
    nanos: i32,
}

// The JSON mapping of protobuf int64 is a string, but numbers are accepted too
fn int64_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// Mapping
// =============================================================================

impl WireService {
    fn into_service(self) -> Service {
        let service_id = self
            .name
            .strip_prefix("services/")
            .unwrap_or(&self.name)
            .to_string();
        Service {
            service_id,
            display_name: self.display_name,
            business_entity_name: self.business_entity_name,
        }
    }
}

impl WireSku {
    fn into_entities(self, service_id: &str, out: &mut ServiceSkus) {
        let prefix = format!("services/{}/skus/", service_id);
        let sku_id = self
            .name
            .strip_prefix(&prefix)
            .unwrap_or(&self.name)
            .to_string();

        for info in self.pricing_info {
            out.pricing.push(info.into_pricing_info(&sku_id));
        }

        let geo = self.geo_taxonomy.unwrap_or_default();
        out.skus.push(Sku {
            sku_id,
            service_id: service_id.to_string(),
            sku_name: self.sku_id,
            description: self.description,
            category: Category {
                service_display_name: self.category.service_display_name,
                resource_family: self.category.resource_family,
                resource_group: self.category.resource_group,
                usage_type: self.category.usage_type,
            },
            service_regions: self.service_regions,
            geo_taxonomy: GeoTaxonomy {
                kind: geo.kind.unwrap_or_else(|| "TYPE_UNSPECIFIED".to_string()),
                regions: geo.regions,
            },
        });
    }
}

impl WirePricingInfo {
    fn into_pricing_info(self, sku_id: &str) -> PricingInfo {
        let expression = self.pricing_expression;
        let currency_code = expression
            .tiered_rates
            .first()
            .map(|rate| rate.unit_price.currency_code.clone())
            .unwrap_or_default();
        let tiered_rates = expression
            .tiered_rates
            .into_iter()
            .map(|rate| TieredRate {
                start_usage_amount: rate.start_usage_amount,
                unit_price: Money {
                    currency_code: rate.unit_price.currency_code,
                    units: rate.unit_price.units,
                    nanos: rate.unit_price.nanos,
                },
            })
            .collect();

        PricingInfo {
            sku_id: sku_id.to_string(),
            // Absent timestamps fall back to the Unix epoch
            effective_time: self.effective_time.unwrap_or_default(),
            summary: self.summary,
            currency_code,
            usage_unit: expression.usage_unit,
            usage_unit_description: expression.usage_unit_description,
            display_quantity: expression.display_quantity as i64,
            tiered_rates,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

impl GcpCatalogClient {
    pub fn new(settings: GcpCatalogSettings, request_timeout: Duration) -> Result<Self, CatalogError> {
        let transport = HttpTransport::new(request_timeout)?;
        Ok(Self::with_transport(Box::new(transport), settings))
    }

    pub fn with_transport(transport: Box<dyn CatalogTransport>, settings: GcpCatalogSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    fn base_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(key) = &self.settings.api_key {
            query.push(("key", key.clone()));
        }
        if let Some(page_size) = self.settings.page_size {
            query.push(("pageSize", page_size.to_string()));
        }
        query
    }

    /// Walk every page of `url`, handing each decoded page to `on_page`,
    /// which returns that page's continuation token.
    fn fetch_all<T, F>(
        &self,
        ctx: &CallContext,
        url: &str,
        extra_query: &[(&'static str, String)],
        mut on_page: F,
    ) -> Result<(), CatalogError>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> String,
    {
        let mut page_token = String::new();
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;
        loop {
            ctx.check()?;

            let mut query = self.base_query();
            query.extend(extra_query.iter().cloned());
            if !page_token.is_empty() {
                query.push(("pageToken", page_token.clone()));
            }

            let body = self.transport.get(url, &query, ctx.remaining())?;
            let page: T = serde_json::from_str(&body).map_err(|source| CatalogError::Payload {
                url: url.to_string(),
                source,
            })?;
            pages += 1;

            page_token = on_page(page);
            if page_token.is_empty() {
                debug!("Fetched {} page(s) from {}", pages, url);
                return Ok(());
            }
            if !seen_tokens.insert(page_token.clone()) {
                return Err(CatalogError::RepeatedPageToken {
                    url: url.to_string(),
                    token: page_token,
                });
            }
        }
    }
}

impl CatalogSource for GcpCatalogClient {
    fn list_services(&self, ctx: &CallContext) -> Result<Vec<Service>, CatalogError> {
        let url = format!("{}/services", self.settings.base_url);
        let mut services = Vec::new();
        self.fetch_all(ctx, &url, &[], |page: ListServicesResponse| {
            services.extend(page.services.into_iter().map(WireService::into_service));
            page.next_page_token
        })?;
        Ok(services)
    }

    fn list_skus(&self, ctx: &CallContext, service_id: &str) -> Result<ServiceSkus, CatalogError> {
        let url = format!(
            "{}/services/{}/skus",
            self.settings.base_url,
            urlencoding::encode(service_id)
        );
        let mut extra_query = Vec::new();
        if let Some(currency) = &self.settings.currency_code {
            extra_query.push(("currencyCode", currency.clone()));
        }

        let mut result = ServiceSkus::default();
        self.fetch_all(ctx, &url, &extra_query, |page: ListSkusResponse| {
            for sku in page.skus {
                sku.into_entities(service_id, &mut result);
            }
            page.next_page_token
        })?;
        Ok(result)
    }
}
