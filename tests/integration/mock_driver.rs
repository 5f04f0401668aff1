//! Mock scrape driver for integration testing.
//!
//! Provides a deterministic `ScrapeDriver` implementation that returns
//! scripted listing pages, counts calls, and can be forced into error
//! states — all in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pricelens::scrape::{RawCard, ScrapeDriver, ScrapePage};

/// Build a sold-listings page with the given price texts.
pub fn sold_page(prices: &[&str]) -> ScrapePage {
    ScrapePage {
        raw_html: String::new(),
        locale_hint: Some("en-US".to_string()),
        cards: prices
            .iter()
            .enumerate()
            .map(|(i, price)| RawCard {
                title: format!("listing {i}"),
                price_text: (*price).to_string(),
                condition_text: "Pre-owned".to_string(),
                sold_text: "Sold Jul 12, 2026".to_string(),
                url: format!("https://market.example.com/itm/{i}"),
            })
            .collect(),
    }
}

/// A deterministic scripted driver.
///
/// Pages are keyed by query; unknown queries get the default page.
/// Shared counters let tests assert how often (and how concurrently)
/// the session manager drove the session.
pub struct ScriptedDriver {
    pages: HashMap<String, ScrapePage>,
    default_page: ScrapePage,
    /// Artificial per-navigation latency, to widen race windows.
    latency: Duration,
    /// If set, all navigations return this error.
    force_error: Arc<Mutex<Option<String>>>,
    pub open_calls: Arc<AtomicUsize>,
    pub navigate_calls: Arc<AtomicUsize>,
    pub close_calls: Arc<AtomicUsize>,
    /// Set while a navigation is in flight; trips `overlap_detected`
    /// if a second navigation starts before the first ends.
    in_flight: Arc<AtomicBool>,
    pub overlap_detected: Arc<AtomicBool>,
}

impl ScriptedDriver {
    pub fn new(default_page: ScrapePage) -> Self {
        Self {
            pages: HashMap::new(),
            default_page,
            latency: Duration::from_millis(20),
            force_error: Arc::new(Mutex::new(None)),
            open_calls: Arc::new(AtomicUsize::new(0)),
            navigate_calls: Arc::new(AtomicUsize::new(0)),
            close_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicBool::new(false)),
            overlap_detected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_page(mut self, query: &str, page: ScrapePage) -> Self {
        self.pages.insert(query.to_string(), page);
        self
    }

    /// Force all subsequent navigations to fail.
    pub fn set_error(&self, message: &str) {
        *self.force_error.lock().unwrap() = Some(message.to_string());
    }

    /// Handles to the shared counters, to keep after the driver is
    /// boxed into the session.
    pub fn counters(&self) -> DriverCounters {
        DriverCounters {
            open_calls: self.open_calls.clone(),
            navigate_calls: self.navigate_calls.clone(),
            close_calls: self.close_calls.clone(),
            overlap_detected: self.overlap_detected.clone(),
            force_error: self.force_error.clone(),
        }
    }
}

#[derive(Clone)]
pub struct DriverCounters {
    pub open_calls: Arc<AtomicUsize>,
    pub navigate_calls: Arc<AtomicUsize>,
    pub close_calls: Arc<AtomicUsize>,
    pub overlap_detected: Arc<AtomicBool>,
    force_error: Arc<Mutex<Option<String>>>,
}

impl DriverCounters {
    pub fn set_error(&self, message: &str) {
        *self.force_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl ScrapeDriver for ScriptedDriver {
    async fn open(&mut self) -> Result<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate_and_extract(&mut self, query: &str) -> Result<ScrapePage> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap_detected.store(true, Ordering::SeqCst);
        }
        self.navigate_calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        let forced = self.force_error.lock().unwrap().clone();
        self.in_flight.store(false, Ordering::SeqCst);

        if let Some(message) = forced {
            return Err(anyhow!("{message}"));
        }

        Ok(self
            .pages
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.default_page.clone()))
    }

    async fn close(&mut self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
