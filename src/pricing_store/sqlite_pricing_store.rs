use super::error::StoreError;
use super::models::{
    PricingInfo, PricingTable, PricingUpdate, PricingUpdateRecord, PricingUpdateStatus, Service,
    Sku,
};
use super::schema::validate_schema;
use super::PricingRepository;
use crate::context::CallContext;
use crate::sqlite_persistence::{connect, Migrator};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub struct SqlitePricingStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePricingStore {
    /// Connect to `database_url`, apply pending migrations and check the
    /// resulting schema.
    pub fn open(database_url: &str, migrator: &Migrator, ctx: &CallContext) -> Result<Self> {
        let mut conn = connect(database_url)
            .with_context(|| format!("Failed to open pricing database {}", database_url))?;

        let applied = migrator
            .apply(&mut conn, ctx)
            .context("Failed to migrate pricing database")?;
        if !applied.is_empty() {
            info!(
                "Pricing database {} migrated ({} unit(s))",
                database_url,
                applied.len()
            );
        }

        validate_schema(&conn).context("Pricing database schema validation failed")?;

        Ok(Self::from_connection(conn))
    }

    /// Wrap an already configured connection without migrating it.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the underlying connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    // Fixed-width nanosecond precision keeps equal instants equal as text,
    // which the (sku_id, effective_time) unique key relies on.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid stored timestamp {}", s))?
            .with_timezone(&Utc))
    }

    fn encode<T: Serialize>(
        entity: &'static str,
        key: &str,
        value: &T,
    ) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|source| StoreError::Serialization {
            entity,
            key: key.to_string(),
            source,
        })
    }

    fn decode<T: DeserializeOwned + Default>(column: &str, blob: Option<Vec<u8>>) -> Result<T> {
        match blob {
            Some(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to decode stored {}", column)),
            None => Ok(T::default()),
        }
    }

    fn check(ctx: &CallContext, entity: &'static str, key: &str) -> Result<(), StoreError> {
        ctx.check().map_err(|source| StoreError::Interrupted {
            entity,
            key: key.to_string(),
            source,
        })
    }

    pub fn get_service(&self, service_id: &str) -> Result<Option<Service>> {
        let conn = self.conn.lock().unwrap();
        let service = conn
            .query_row(
                "SELECT service_id, display_name, business_entity_name
                 FROM services WHERE service_id = ?1",
                params![service_id],
                |row| {
                    Ok(Service {
                        service_id: row.get("service_id")?,
                        display_name: row.get("display_name")?,
                        business_entity_name: row
                            .get::<_, Option<String>>("business_entity_name")?
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(service)
    }

    pub fn get_sku(&self, sku_id: &str) -> Result<Option<Sku>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT sku_id, service_id, sku_name, description, category, service_regions,
                        geo_taxonomy
                 FROM skus WHERE sku_id = ?1",
                params![sku_id],
                |row| {
                    Ok((
                        row.get::<_, String>("sku_id")?,
                        row.get::<_, String>("service_id")?,
                        row.get::<_, String>("sku_name")?,
                        row.get::<_, String>("description")?,
                        row.get::<_, Option<Vec<u8>>>("category")?,
                        row.get::<_, Option<Vec<u8>>>("service_regions")?,
                        row.get::<_, Option<Vec<u8>>>("geo_taxonomy")?,
                    ))
                },
            )
            .optional()?;

        let Some((sku_id, service_id, sku_name, description, category, regions, geo)) = raw else {
            return Ok(None);
        };
        Ok(Some(Sku {
            sku_id,
            service_id,
            sku_name,
            description,
            category: Self::decode("category", category)?,
            service_regions: Self::decode("service_regions", regions)?,
            geo_taxonomy: Self::decode("geo_taxonomy", geo)?,
        }))
    }

    /// All pricing snapshots of a SKU, oldest first.
    pub fn get_pricing_info(&self, sku_id: &str) -> Result<Vec<PricingInfo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT sku_id, effective_time, summary, currency_code, usage_unit,
                    usage_unit_description, display_quantity, tiered_rates
             FROM pricing_info WHERE sku_id = ?1 ORDER BY effective_time ASC",
        )?;
        let rows = stmt
            .query_map(params![sku_id], |row| {
                Ok((
                    row.get::<_, String>("sku_id")?,
                    row.get::<_, String>("effective_time")?,
                    row.get::<_, Option<String>>("summary")?,
                    row.get::<_, Option<String>>("currency_code")?,
                    row.get::<_, Option<String>>("usage_unit")?,
                    row.get::<_, Option<String>>("usage_unit_description")?,
                    row.get::<_, Option<i64>>("display_quantity")?,
                    row.get::<_, Option<Vec<u8>>>("tiered_rates")?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(sku_id, effective_time, summary, currency, unit, unit_desc, quantity, rates)|
                 -> Result<PricingInfo> {
                    Ok(PricingInfo {
                        sku_id,
                        effective_time: Self::parse_datetime(&effective_time)?,
                        summary: summary.unwrap_or_default(),
                        currency_code: currency.unwrap_or_default(),
                        usage_unit: unit.unwrap_or_default(),
                        usage_unit_description: unit_desc.unwrap_or_default(),
                        display_quantity: quantity.unwrap_or_default(),
                        tiered_rates: Self::decode("tiered_rates", rates)?,
                    })
                },
            )
            .collect()
    }

    pub fn latest_pricing_update(&self) -> Result<Option<PricingUpdateRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                "SELECT update_id, update_time, status, services_updated, skus_updated, log_message
                 FROM pricing_updates ORDER BY update_id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>("update_id")?,
                        row.get::<_, String>("update_time")?,
                        row.get::<_, String>("status")?,
                        row.get::<_, i64>("services_updated")?,
                        row.get::<_, i64>("skus_updated")?,
                        row.get::<_, Option<String>>("log_message")?,
                    ))
                },
            )
            .optional()?;

        let Some((update_id, update_time, status, services_updated, skus_updated, log_message)) =
            raw
        else {
            return Ok(None);
        };
        let status = PricingUpdateStatus::parse(&status)
            .with_context(|| format!("Unknown pricing update status {}", status))?;
        Ok(Some(PricingUpdateRecord {
            update_id,
            update: PricingUpdate {
                update_time: Self::parse_datetime(&update_time)?,
                status,
                services_updated,
                skus_updated,
                log_message: log_message.unwrap_or_default(),
            },
        }))
    }

    pub fn count_rows(&self, table: PricingTable) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

impl PricingRepository for SqlitePricingStore {
    fn upsert_service(&self, ctx: &CallContext, service: &Service) -> Result<(), StoreError> {
        Self::check(ctx, "service", &service.service_id)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO services (service_id, display_name, business_entity_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (service_id) DO UPDATE SET
                display_name = excluded.display_name,
                business_entity_name = excluded.business_entity_name",
            params![
                service.service_id,
                service.display_name,
                service.business_entity_name
            ],
        )
        .map_err(|e| StoreError::from_sqlite("service", &service.service_id, e))?;
        debug!("Upserted service {}", service.service_id);
        Ok(())
    }

    fn upsert_sku(&self, ctx: &CallContext, sku: &Sku) -> Result<(), StoreError> {
        Self::check(ctx, "sku", &sku.sku_id)?;
        let category = Self::encode("sku", &sku.sku_id, &sku.category)?;
        let service_regions = Self::encode("sku", &sku.sku_id, &sku.service_regions)?;
        let geo_taxonomy = Self::encode("sku", &sku.sku_id, &sku.geo_taxonomy)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO skus (sku_id, service_id, sku_name, description, category,
                               service_regions, geo_taxonomy)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (sku_id) DO UPDATE SET
                service_id = excluded.service_id,
                sku_name = excluded.sku_name,
                description = excluded.description,
                category = excluded.category,
                service_regions = excluded.service_regions,
                geo_taxonomy = excluded.geo_taxonomy",
            params![
                sku.sku_id,
                sku.service_id,
                sku.sku_name,
                sku.description,
                category,
                service_regions,
                geo_taxonomy
            ],
        )
        .map_err(|e| StoreError::from_sqlite("sku", &sku.sku_id, e))?;
        Ok(())
    }

    fn upsert_pricing_info(&self, ctx: &CallContext, info: &PricingInfo) -> Result<(), StoreError> {
        let effective_time = Self::format_datetime(&info.effective_time);
        let key = format!("{}@{}", info.sku_id, effective_time);
        Self::check(ctx, "pricing_info", &key)?;
        let tiered_rates = Self::encode("pricing_info", &key, &info.tiered_rates)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pricing_info (sku_id, effective_time, summary, currency_code, usage_unit,
                                       usage_unit_description, display_quantity, tiered_rates)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (sku_id, effective_time) DO UPDATE SET
                summary = excluded.summary,
                currency_code = excluded.currency_code,
                usage_unit = excluded.usage_unit,
                usage_unit_description = excluded.usage_unit_description,
                display_quantity = excluded.display_quantity,
                tiered_rates = excluded.tiered_rates",
            params![
                info.sku_id,
                effective_time,
                info.summary,
                info.currency_code,
                info.usage_unit,
                info.usage_unit_description,
                info.display_quantity,
                tiered_rates
            ],
        )
        .map_err(|e| StoreError::from_sqlite("pricing_info", key, e))?;
        Ok(())
    }

    fn insert_pricing_update(
        &self,
        ctx: &CallContext,
        update: &PricingUpdate,
    ) -> Result<i64, StoreError> {
        let update_time = Self::format_datetime(&update.update_time);
        Self::check(ctx, "pricing_update", &update_time)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pricing_updates (update_time, status, services_updated, skus_updated,
                                          log_message)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                update_time,
                update.status.as_str(),
                update.services_updated,
                update.skus_updated,
                update.log_message
            ],
        )
        .map_err(|e| StoreError::from_sqlite("pricing_update", &update_time, e))?;
        Ok(conn.last_insert_rowid())
    }
}
