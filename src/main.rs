//! PRICELENS — Hybrid price recommendation service
//!
//! Entry point. Loads configuration, initialises structured logging,
//! loads the internal sales data and the model artifact, opens the
//! scrape session, and serves the HTTP API with graceful shutdown on
//! Ctrl+C.
//!
//! Exit codes: 0 normal, 1 startup failure (data load or driver init),
//! 2 configuration error.

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use pricelens::config::{AppConfig, DEFAULT_CONFIG_PATH};
use pricelens::engine::Pricer;
use pricelens::internal::{CsvStore, InternalStore, Matcher, SqliteStore};
use pricelens::model::MlAdapter;
use pricelens::scrape::{HttpDriver, ScrapeConfig, SessionManager};
use pricelens::server;

const BANNER: &str = r#"
 ____  ____  ___ ____ _____ _     _____ _   _ ____
|  _ \|  _ \|_ _/ ___| ____| |   | ____| \ | / ___|
| |_) | |_) || | |   |  _| | |   |  _| |  \| \___ \
|  __/|  _ < | | |___| |___| |___| |___| |\  |___) |
|_|   |_| \_\___\____|_____|_____|_____|_| \_|____/

  Hybrid market / internal / ML price recommendations
  v0.1.0
"#;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = match AppConfig::load(DEFAULT_CONFIG_PATH) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::from(2);
        }
    };

    init_logging();
    println!("{BANNER}");

    info!(
        internal_data_path = %cfg.internal_data_path,
        model_path = %cfg.model_path,
        cache_ttl_secs = cfg.cache_ttl_secs,
        max_listings = cfg.max_listings,
        max_internal_matches = cfg.max_internal_matches,
        scrape_timeout_ms = cfg.scrape_timeout_ms,
        headless = cfg.headless,
        port = cfg.server.port,
        "PRICELENS starting up"
    );

    match run(cfg).await {
        Ok(()) => {
            info!("PRICELENS shut down cleanly.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Startup failure");
            ExitCode::from(1)
        }
    }
}

async fn run(cfg: AppConfig) -> Result<()> {
    // Internal data: fatal if unloadable at startup.
    let store: Box<dyn InternalStore> = if cfg.is_relational_source() {
        Box::new(SqliteStore::connect(&cfg.internal_data_path).await?)
    } else {
        Box::new(CsvStore::new(&cfg.internal_data_path))
    };
    let records = store
        .load_all()
        .await
        .context("Failed to load internal sales data")?;
    let matcher = Arc::new(Matcher::new(records, cfg.max_internal_matches));
    info!(records = matcher.record_count(), "Internal matching engine ready");

    // Model artifact: a failed load degrades to no-ML, never fatal.
    let ml = Arc::new(MlAdapter::load(&cfg.model_path).await);

    // Scrape session: fatal if the driver cannot open.
    let driver = HttpDriver::new(
        cfg.marketplace_url.clone(),
        Duration::from_millis(cfg.scrape_timeout_ms),
    );
    let session = SessionManager::start(
        Box::new(driver),
        ScrapeConfig {
            max_listings: cfg.max_listings,
            timeout: Duration::from_millis(cfg.scrape_timeout_ms),
            delay_min: Duration::from_millis(cfg.scrape_delay_ms_min),
            delay_max: Duration::from_millis(cfg.scrape_delay_ms_max),
        },
    )
    .await?;

    let pricer = Arc::new(Pricer::new(matcher, session, ml, cfg.cache_ttl_secs));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tokio::select! {
        result = server::serve(pricer.clone(), cfg.server.port) => {
            pricer.shutdown().await;
            result
        }
        _ = &mut shutdown => {
            info!("Shutdown signal received. Closing scrape session...");
            pricer.shutdown().await;
            Ok(())
        }
    }
}

/// Initialise the `tracing` subscriber.
///
/// - In development (RUST_LOG set), uses human-readable format.
/// - With PRICELENS_LOG_JSON set, uses structured JSON logging to stdout.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pricelens=info"));

    let json_logging = std::env::var("PRICELENS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
