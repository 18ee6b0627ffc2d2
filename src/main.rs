use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cloud_pricing_sync::catalog_source::GcpCatalogClient;
use cloud_pricing_sync::config::{self, AppConfig};
use cloud_pricing_sync::context::CallContext;
use cloud_pricing_sync::pricing_store::SqlitePricingStore;
use cloud_pricing_sync::sqlite_persistence::{connect, Migrator};
use cloud_pricing_sync::sync::{run_periodically, SyncJob};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// SQLite database, as a path or `file:` URI. Falls back to $DATABASE_URL,
    /// then to `file:cloud-pricing.db`.
    #[clap(long)]
    pub database_url: Option<String>,

    /// Directory of `*.sql` migration units to use instead of the built-in ones.
    #[clap(long, value_parser = parse_path)]
    pub migrations_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations.
    Migrate {
        /// Only list applied and pending migrations.
        #[clap(long)]
        status: bool,
    },
    /// Pull the billing catalog into the database.
    Sync {
        /// Cloud Billing API key. Falls back to $GCP_API_KEY.
        #[clap(long)]
        api_key: Option<String>,

        /// Base URL of the Cloud Billing Catalog API.
        #[clap(long)]
        catalog_base_url: Option<String>,

        /// Number of entries requested per page.
        #[clap(long)]
        page_size: Option<u32>,

        /// Currency the prices are requested in.
        #[clap(long)]
        currency_code: Option<String>,

        /// Timeout in seconds for each catalog request.
        #[clap(long)]
        request_timeout_sec: Option<u64>,

        /// Keep running, syncing every N minutes until interrupted.
        #[clap(long)]
        interval_minutes: Option<u64>,
    },
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        let mut cli_config = config::CliConfig {
            database_url: args.database_url.clone(),
            migrations_dir: args.migrations_dir.clone(),
            ..Default::default()
        };
        if let Command::Sync {
            api_key,
            catalog_base_url,
            page_size,
            currency_code,
            request_timeout_sec,
            interval_minutes,
        } = &args.command
        {
            cli_config.api_key = api_key.clone();
            cli_config.catalog_base_url = catalog_base_url.clone();
            cli_config.page_size = *page_size;
            cli_config.currency_code = currency_code.clone();
            cli_config.request_timeout_sec = *request_timeout_sec;
            cli_config.sync_interval_minutes = *interval_minutes;
        }
        cli_config
    }
}

fn print_migration_status(app_config: &AppConfig, migrator: &Migrator) -> Result<()> {
    let conn = connect(&app_config.database_url)
        .with_context(|| format!("Failed to open database {}", app_config.database_url))?;
    let applied = migrator.applied_versions(&conn)?;
    let pending = migrator.pending(&conn)?;

    for version in &applied {
        println!("applied  {}", version);
    }
    for unit in &pending {
        println!("pending  {}", unit.name);
    }
    info!(
        "{} applied, {} pending migration(s)",
        applied.len(),
        pending.len()
    );
    Ok(())
}

fn build_sync_job(app_config: &AppConfig, migrator: &Migrator, ctx: &CallContext) -> Result<SyncJob> {
    let store = SqlitePricingStore::open(&app_config.database_url, migrator, ctx)?;
    if app_config.catalog.api_key.is_none() {
        info!("No catalog API key configured, relying on anonymous access");
    }
    let client = GcpCatalogClient::new(
        app_config.catalog.gcp_settings(),
        app_config.catalog.request_timeout,
    )
    .context("Failed to create catalog client")?;
    Ok(SyncJob::new(Arc::new(client), Arc::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  database_url: {}", app_config.database_url);
    if let Some(dir) = &app_config.migrations_dir {
        info!("  migrations_dir: {:?}", dir);
    }

    let migrator = match &app_config.migrations_dir {
        Some(dir) => Migrator::from_dir(dir)
            .with_context(|| format!("Failed to load migrations from {:?}", dir))?,
        None => Migrator::embedded(),
    };

    let shutdown_token = CancellationToken::new();
    {
        let shutdown_token = shutdown_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, initiating graceful shutdown");
                shutdown_token.cancel();
            }
        });
    }
    let ctx = CallContext::new(shutdown_token.clone());

    match cli_args.command {
        Command::Migrate { status: true } => print_migration_status(&app_config, &migrator),
        Command::Migrate { status: false } => {
            let mut conn = connect(&app_config.database_url).with_context(|| {
                format!("Failed to open database {}", app_config.database_url)
            })?;
            let applied = migrator.apply(&mut conn, &ctx)?;
            cloud_pricing_sync::pricing_store::validate_schema(&conn)
                .context("Schema validation failed after migrating")?;
            info!("Migration complete ({} unit(s) applied)", applied.len());
            Ok(())
        }
        Command::Sync { .. } => {
            // The catalog client wraps reqwest's blocking client, which must be
            // created and dropped off the async workers
            let job = {
                let app_config = app_config.clone();
                let ctx = ctx.clone();
                tokio::task::spawn_blocking(move || build_sync_job(&app_config, &migrator, &ctx))
                    .await??
            };
            let job = Arc::new(job);

            let result = match app_config.sync_interval {
                Some(interval) => {
                    info!("Syncing every {:?} until interrupted", interval);
                    run_periodically(job.clone(), interval, shutdown_token.clone()).await;
                    Ok(())
                }
                None => {
                    let pass_job = job.clone();
                    tokio::task::spawn_blocking(move || pass_job.run(&ctx))
                        .await?
                        .map(|_| ())
                        .context("Pricing sync failed")
                }
            };

            tokio::task::spawn_blocking(move || drop(job)).await?;
            result
        }
    }
}
