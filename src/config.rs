//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `pricelens.toml` and deserializes into strongly-typed structs.
//! Every tunable can also be set from the environment (the upper-case
//! names below), which takes precedence over the file; the file itself
//! is optional so a fully env-driven deployment needs no TOML at all.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default TOML config path.
pub const DEFAULT_CONFIG_PATH: &str = "pricelens.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Path or URL to the serialized regressor artifact.
    pub model_path: String,
    /// CSV path, or a `sqlite:` connection string for the relational backend.
    pub internal_data_path: String,
    /// Recommendation cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Cap on listings per scrape fetch.
    pub max_listings: usize,
    /// Cap on aggregated internal records per match.
    pub max_internal_matches: usize,
    /// Hard deadline for one scrape fetch, in milliseconds.
    pub scrape_timeout_ms: u64,
    /// Lower bound of the randomized inter-fetch delay, in milliseconds.
    pub scrape_delay_ms_min: u64,
    /// Upper bound of the randomized inter-fetch delay, in milliseconds.
    pub scrape_delay_ms_max: u64,
    /// Browser mode for drivers that support it.
    pub headless: bool,
    /// Marketplace search URL base for the bundled HTTP driver.
    pub marketplace_url: String,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: "model.json".to_string(),
            internal_data_path: "internal_sales.csv".to_string(),
            cache_ttl_secs: 3600,
            max_listings: 30,
            max_internal_matches: 50,
            scrape_timeout_ms: 30_000,
            scrape_delay_ms_min: 2_000,
            scrape_delay_ms_max: 4_000,
            headless: true,
            marketplace_url: "https://www.ebay.com/sch/i.html".to_string(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

impl AppConfig {
    /// Load configuration: TOML file (if present) then env overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {path}"))?
        } else {
            AppConfig::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of the file values.
    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("MODEL_PATH") {
            self.model_path = v;
        }
        if let Ok(v) = std::env::var("INTERNAL_DATA_PATH") {
            self.internal_data_path = v;
        }
        if let Ok(v) = std::env::var("MARKETPLACE_URL") {
            self.marketplace_url = v;
        }
        if let Ok(v) = std::env::var("CACHE_TTL") {
            self.cache_ttl_secs = parse_env("CACHE_TTL", &v)?;
        }
        if let Ok(v) = std::env::var("MAX_LISTINGS") {
            self.max_listings = parse_env("MAX_LISTINGS", &v)?;
        }
        if let Ok(v) = std::env::var("MAX_INTERNAL_MATCHES") {
            self.max_internal_matches = parse_env("MAX_INTERNAL_MATCHES", &v)?;
        }
        if let Ok(v) = std::env::var("SCRAPE_TIMEOUT_MS") {
            self.scrape_timeout_ms = parse_env("SCRAPE_TIMEOUT_MS", &v)?;
        }
        if let Ok(v) = std::env::var("SCRAPE_DELAY_MS_MIN") {
            self.scrape_delay_ms_min = parse_env("SCRAPE_DELAY_MS_MIN", &v)?;
        }
        if let Ok(v) = std::env::var("SCRAPE_DELAY_MS_MAX") {
            self.scrape_delay_ms_max = parse_env("SCRAPE_DELAY_MS_MAX", &v)?;
        }
        if let Ok(v) = std::env::var("HEADLESS") {
            self.headless = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot run with.
    fn validate(&self) -> Result<()> {
        if self.internal_data_path.is_empty() {
            anyhow::bail!("internal_data_path must not be empty");
        }
        if self.scrape_delay_ms_min > self.scrape_delay_ms_max {
            anyhow::bail!(
                "scrape_delay_ms_min ({}) exceeds scrape_delay_ms_max ({})",
                self.scrape_delay_ms_min,
                self.scrape_delay_ms_max,
            );
        }
        if self.max_listings == 0 {
            anyhow::bail!("max_listings must be at least 1");
        }
        Ok(())
    }

    /// Whether the internal data source is a relational connection string.
    pub fn is_relational_source(&self) -> bool {
        self.internal_data_path.starts_with("sqlite:")
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid value for {name}: {e}"))
}
