//! Expected shape of the pricing tables once every embedded migration ran.
//!
//! Checked by [`SqlitePricingStore::open`](super::SqlitePricingStore::open)
//! so a database migrated from a foreign set of units is refused early.

use crate::expected_column;
use crate::sqlite_persistence::{validate_tables, ForeignKey, ForeignKeyOnDelete, SqlType, Table};
use rusqlite::Connection;

const SERVICES_TABLE: Table = Table {
    name: "services",
    columns: &[
        expected_column!("service_id", SqlType::Text, is_primary_key = true, non_null = true),
        expected_column!("display_name", SqlType::Text, non_null = true),
        expected_column!("business_entity_name", SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const SKU_SERVICE_FK: ForeignKey = ForeignKey {
    foreign_table: "services",
    foreign_column: "service_id",
    on_delete: ForeignKeyOnDelete::Cascade,
};

const SKUS_TABLE: Table = Table {
    name: "skus",
    columns: &[
        expected_column!("sku_id", SqlType::Text, is_primary_key = true, non_null = true),
        expected_column!(
            "service_id",
            SqlType::Text,
            non_null = true,
            foreign_key = Some(&SKU_SERVICE_FK)
        ),
        expected_column!("sku_name", SqlType::Text, non_null = true),
        expected_column!("description", SqlType::Text, non_null = true),
        expected_column!("category", SqlType::Blob),
        expected_column!("service_regions", SqlType::Blob),
        expected_column!("geo_taxonomy", SqlType::Blob),
    ],
    indices: &["idx_skus_service_id"],
    unique_constraints: &[],
};

const PRICING_INFO_SKU_FK: ForeignKey = ForeignKey {
    foreign_table: "skus",
    foreign_column: "sku_id",
    on_delete: ForeignKeyOnDelete::Cascade,
};

const PRICING_INFO_TABLE: Table = Table {
    name: "pricing_info",
    columns: &[
        expected_column!("pricing_info_id", SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        expected_column!(
            "sku_id",
            SqlType::Text,
            non_null = true,
            foreign_key = Some(&PRICING_INFO_SKU_FK)
        ),
        expected_column!("effective_time", SqlType::Text, non_null = true),
        expected_column!("summary", SqlType::Text),
        expected_column!("currency_code", SqlType::Text),
        expected_column!("usage_unit", SqlType::Text),
        expected_column!("usage_unit_description", SqlType::Text),
        expected_column!("display_quantity", SqlType::Integer),
        expected_column!("tiered_rates", SqlType::Blob),
    ],
    indices: &[],
    unique_constraints: &[&["sku_id", "effective_time"]],
};

const PRICING_UPDATES_TABLE: Table = Table {
    name: "pricing_updates",
    columns: &[
        expected_column!("update_id", SqlType::Integer, is_primary_key = true), // AUTOINCREMENT
        expected_column!("update_time", SqlType::Text, non_null = true),
        expected_column!("status", SqlType::Text, non_null = true),
        expected_column!("services_updated", SqlType::Integer, non_null = true),
        expected_column!("skus_updated", SqlType::Integer, non_null = true),
        expected_column!("log_message", SqlType::Text),
    ],
    indices: &["idx_pricing_updates_update_time"],
    unique_constraints: &[],
};

const SCHEMA_MIGRATIONS_TABLE: Table = Table {
    name: "schema_migrations",
    columns: &[
        expected_column!("version", SqlType::Text, is_primary_key = true, non_null = true),
        expected_column!(
            "applied_at",
            SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const PRICING_TABLES: &[Table] = &[
    SERVICES_TABLE,
    SKUS_TABLE,
    PRICING_INFO_TABLE,
    PRICING_UPDATES_TABLE,
    SCHEMA_MIGRATIONS_TABLE,
];

/// Check the live schema against [`PRICING_TABLES`].
pub fn validate_schema(conn: &Connection) -> anyhow::Result<()> {
    validate_tables(conn, PRICING_TABLES)
}
