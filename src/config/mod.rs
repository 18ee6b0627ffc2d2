mod file_config;

pub use file_config::{CatalogConfig, FileConfig};

use crate::catalog_source::GcpCatalogSettings;
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "file:cloud-pricing.db";
pub const DEFAULT_REQUEST_TIMEOUT_SEC: u64 = 60;
/// Largest page the Cloud Billing Catalog API accepts.
pub const MAX_PAGE_SIZE: u32 = 5000;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub database_url: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub catalog_base_url: Option<String>,
    pub page_size: Option<u32>,
    pub currency_code: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub sync_interval_minutes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Load migration units from here instead of the embedded ones.
    pub migrations_dir: Option<PathBuf>,
    /// None runs a single sync pass.
    pub sync_interval: Option<Duration>,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub page_size: Option<u32>,
    pub currency_code: Option<String>,
    pub request_timeout: Duration,
}

impl CatalogSettings {
    pub fn gcp_settings(&self) -> GcpCatalogSettings {
        GcpCatalogSettings {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            page_size: self.page_size,
            currency_code: self.currency_code.clone(),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present; `DATABASE_URL` and
    /// `GCP_API_KEY` fill in what neither sets.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        Self::resolve_with_env(cli, file_config, |name| std::env::var(name).ok())
    }

    pub fn resolve_with_env(
        cli: &CliConfig,
        file_config: Option<FileConfig>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let database_url = file
            .database_url
            .or_else(|| cli.database_url.clone())
            .or_else(|| env("DATABASE_URL"))
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let migrations_dir = file
            .migrations_dir
            .map(PathBuf::from)
            .or_else(|| cli.migrations_dir.clone());
        if let Some(dir) = &migrations_dir {
            if !dir.is_dir() {
                bail!("Migrations directory does not exist: {:?}", dir);
            }
        }

        let sync_interval = match file.sync_interval_minutes.or(cli.sync_interval_minutes) {
            Some(0) => bail!("sync_interval_minutes must be greater than 0"),
            Some(minutes) => Some(Duration::from_secs(minutes * 60)),
            None => None,
        };

        let catalog_file = file.catalog.unwrap_or_default();
        let page_size = catalog_file.page_size.or(cli.page_size);
        if let Some(size) = page_size {
            if size == 0 || size > MAX_PAGE_SIZE {
                bail!("page_size must be between 1 and {}, got {}", MAX_PAGE_SIZE, size);
            }
        }
        let catalog = CatalogSettings {
            api_key: catalog_file
                .api_key
                .or_else(|| cli.api_key.clone())
                .or_else(|| env("GCP_API_KEY")),
            base_url: catalog_file
                .base_url
                .or_else(|| cli.catalog_base_url.clone())
                .unwrap_or_else(|| crate::catalog_source::DEFAULT_CATALOG_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            page_size,
            currency_code: catalog_file
                .currency_code
                .or_else(|| cli.currency_code.clone()),
            request_timeout: Duration::from_secs(
                catalog_file
                    .request_timeout_sec
                    .or(cli.request_timeout_sec)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SEC),
            ),
        };

        Ok(Self {
            database_url,
            migrations_dir,
            sync_interval,
            catalog,
        })
    }
}
