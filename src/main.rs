//! Supplier catalog sync
//!
//! Long-running process that:
//! - Pulls product pages from the supplier API under a shared cost budget
//! - Persists sync jobs so rate-limited and failed attempts resume later
//! - Polls for due jobs on a fixed interval and dispatches them one at a time

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::signal;
use tracing::{error, info, warn};

use cost_limiter::{LimiterConfig, RateLimiter};
use job_store::{FileJobStore, SharedJobStore};
use supplier::{CatalogExecutor, FileProductSink, SupplierClient, SupplierConfig};
use sync_core::{Clock, RetryPolicy, SystemClock};
use telemetry::{health, init_tracing_from_env, log_snapshot, metrics};
use worker::{
    enqueue_job, has_active_job, requeue_interrupted, JobScheduler, RepeatingTask,
    SchedulerConfig,
};

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default)]
    limiter: LimiterConfig,

    #[serde(default)]
    scheduler: SchedulerConfig,

    #[serde(default)]
    retry: RetryPolicy,

    #[serde(default)]
    supplier: SupplierConfig,

    /// Job table location
    #[serde(default = "default_store_path")]
    store_path: String,

    /// Product catalog location
    #[serde(default = "default_catalog_path")]
    catalog_path: String,

    /// Categories to sync when no job is active at startup
    #[serde(default)]
    categories: Vec<String>,
}

fn default_store_path() -> String {
    "data/jobs.json".to_string()
}

fn default_catalog_path() -> String {
    "data/catalog.json".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryPolicy::default(),
            supplier: SupplierConfig::default(),
            store_path: default_store_path(),
            catalog_path: default_catalog_path(),
            categories: Vec::new(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        self.limiter.validate().context("Invalid limiter config")?;
        self.retry.validate().context("Invalid retry policy")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting supplier sync v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    config.validate()?;

    info!(
        base_url = %config.supplier.base_url,
        max_cost = config.limiter.max_cost,
        restore_rate = config.limiter.restore_rate,
        check_interval_ms = config.scheduler.check_interval_ms,
        max_retries = config.retry.max_retries,
        "Loaded config"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let limiter = Arc::new(RateLimiter::with_clock(&config.limiter, clock.clone()));

    let store = Arc::new(
        FileJobStore::open(&config.store_path)
            .await
            .context("Failed to open job store")?,
    );
    health().job_store.set_healthy();
    let store: SharedJobStore = store;

    let client = Arc::new(
        SupplierClient::new(config.supplier.clone(), limiter.clone())
            .context("Failed to create supplier client")?,
    );
    let sink = Arc::new(
        FileProductSink::open(&config.catalog_path)
            .await
            .context("Failed to open product catalog")?,
    );
    let executor = Arc::new(CatalogExecutor::new(
        client,
        sink,
        config.supplier.page_size,
    ));

    // Nothing is dispatching yet, so any `running` job was cut off by a
    // previous process.
    let requeued = requeue_interrupted(store.as_ref(), clock.now())
        .await
        .context("Failed to requeue interrupted jobs")?;
    if requeued > 0 {
        warn!(requeued, "Requeued jobs interrupted by previous shutdown");
    }

    if !config.categories.is_empty() && !has_active_job(store.as_ref()).await? {
        let id = enqueue_job(
            store.as_ref(),
            config.categories.clone(),
            &config.retry,
            clock.now(),
        )
        .await
        .context("Failed to enqueue sync job")?;
        info!(job_id = %id, "Seeded sync job from config");
    }

    let scheduler = JobScheduler::new(
        config.scheduler.clone(),
        store,
        executor,
        clock,
        config.retry.clone(),
    );
    scheduler.start();

    let metrics_task = RepeatingTask::spawn(
        "metrics-log",
        config.scheduler.metrics_log_interval(),
        || async {
            log_snapshot(&metrics().snapshot());
        },
    );

    shutdown_signal().await;

    info!("Shutting down...");

    // Let the in-flight tick record its outcome before exiting
    scheduler.stop().await;
    metrics_task.stop().await;

    log_snapshot(&metrics().snapshot());
    let report = health().report();
    if !health().is_ready() {
        error!(health = ?report, "Shutting down with unhealthy components");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("SYNC")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Nested fields with underscores don't map reliably through the
    // separator, so the common ones get flat variables.
    if let Ok(url) = std::env::var("SYNC_SUPPLIER_BASE_URL") {
        config.supplier.base_url = url;
    }
    if let Ok(token) = std::env::var("SYNC_SUPPLIER_ACCESS_TOKEN") {
        config.supplier.access_token = Some(token);
    }
    if let Ok(path) = std::env::var("SYNC_STORE_PATH") {
        config.store_path = path;
    }
    if let Ok(categories) = std::env::var("SYNC_CATEGORIES") {
        config.categories = categories
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
