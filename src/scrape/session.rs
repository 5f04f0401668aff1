//! Scrape session manager.
//!
//! Owns the one long-lived driver session for the whole process. Fetches
//! are serialized through a bounded mpsc queue: the marketplace blocks
//! sessions that issue parallel or too-rapid requests, so at most one
//! driver call runs at a time, requests are served in arrival order, and
//! a randomized delay separates successive fetches.

use anyhow::{Context, Result};
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::driver::{ScrapeDriver, ScrapePage};
use super::parse::{parse_card, LocaleHint};
use crate::market;
use crate::types::MarketSample;

/// Scrape tunables, lifted from `AppConfig` at startup.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub max_listings: usize,
    pub timeout: Duration,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_listings: 30,
            timeout: Duration::from_secs(30),
            delay_min: Duration::from_millis(2_000),
            delay_max: Duration::from_millis(4_000),
        }
    }
}

enum Command {
    Fetch {
        query: String,
        reply: oneshot::Sender<MarketSample>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to the session actor. Cheap to clone; all clones feed the same
/// FIFO queue and therefore the same underlying driver session.
#[derive(Clone)]
pub struct SessionManager {
    tx: mpsc::Sender<Command>,
}

impl SessionManager {
    /// Open the driver and spawn the session actor.
    /// Must be called once at process startup.
    pub async fn start(mut driver: Box<dyn ScrapeDriver>, config: ScrapeConfig) -> Result<Self> {
        driver
            .open()
            .await
            .context("Failed to open scrape driver session")?;

        // Capacity 1: callers beyond the in-flight fetch queue up in
        // send() order, preserving FIFO service.
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(run_session(driver, rx, config));

        info!("Scrape session started");
        Ok(Self { tx })
    }

    /// Fetch a market sample for one query.
    ///
    /// Never returns an error: every failure mode degrades to a sample
    /// with `status=Error` and a warning attached.
    pub async fn fetch(&self, query: &str) -> MarketSample {
        let (reply_tx, reply_rx) = oneshot::channel();
        let cmd = Command::Fetch {
            query: query.to_string(),
            reply: reply_tx,
        };

        if self.tx.send(cmd).await.is_err() {
            return MarketSample::error("scrape session unavailable");
        }

        match reply_rx.await {
            Ok(sample) => sample,
            Err(_) => MarketSample::error("scrape session dropped request"),
        }
    }

    /// Close the driver and stop the actor.
    pub async fn stop(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { done: done_tx }).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// The actor loop: exclusive owner of the driver.
async fn run_session(
    mut driver: Box<dyn ScrapeDriver>,
    mut rx: mpsc::Receiver<Command>,
    config: ScrapeConfig,
) {
    let mut last_fetch: Option<Instant> = None;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Fetch { query, reply } => {
                pace(&mut last_fetch, &config).await;
                let sample = fetch_one(driver.as_mut(), &query, &config).await;
                last_fetch = Some(Instant::now());
                // Caller may have abandoned the wait; that's fine.
                let _ = reply.send(sample);
            }
            Command::Shutdown { done } => {
                if let Err(e) = driver.close().await {
                    warn!(error = %e, "Driver close failed");
                }
                info!("Scrape session stopped");
                let _ = done.send(());
                return;
            }
        }
    }

    // All handles dropped: close the driver on the way out.
    if let Err(e) = driver.close().await {
        warn!(error = %e, "Driver close failed");
    }
}

/// Enforce the randomized inter-fetch delay. The first fetch of the
/// session runs immediately.
async fn pace(last_fetch: &mut Option<Instant>, config: &ScrapeConfig) {
    let Some(last) = last_fetch else {
        return;
    };

    let delay = if config.delay_max > config.delay_min {
        rand::thread_rng().gen_range(config.delay_min..=config.delay_max)
    } else {
        config.delay_min
    };

    let elapsed = last.elapsed();
    if elapsed < delay {
        let wait = delay - elapsed;
        debug!(wait_ms = wait.as_millis() as u64, "Pacing before next fetch");
        tokio::time::sleep(wait).await;
    }
}

/// One driver round-trip under the hard deadline, parsed and aggregated.
async fn fetch_one(
    driver: &mut dyn ScrapeDriver,
    query: &str,
    config: &ScrapeConfig,
) -> MarketSample {
    let page = match tokio::time::timeout(config.timeout, driver.navigate_and_extract(query)).await
    {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => {
            warn!(query, error = %e, "Scrape fetch failed");
            return MarketSample::error(format!("scrape failed: {e}"));
        }
        Err(_) => {
            warn!(query, timeout_ms = config.timeout.as_millis() as u64, "Scrape fetch timed out");
            return MarketSample::error("navigation timeout");
        }
    };

    sample_from_page(page, query, config.max_listings)
}

/// Parse extracted cards into listings and aggregate. Malformed cards
/// are dropped with a warning; they never abort the fetch.
fn sample_from_page(page: ScrapePage, query: &str, max_listings: usize) -> MarketSample {
    let locale = LocaleHint::from_lang(page.locale_hint.as_deref());

    let mut dropped = 0usize;
    let mut listings = Vec::new();
    for card in &page.cards {
        if listings.len() >= max_listings {
            break;
        }
        match parse_card(card, locale) {
            Some(listing) => listings.push(listing),
            None => {
                dropped += 1;
                warn!(query, title = %card.title, "Dropping malformed listing card");
            }
        }
    }

    debug!(
        query,
        extracted = page.cards.len(),
        parsed = listings.len(),
        dropped,
        "Cards parsed"
    );

    let mut sample = market::aggregate(listings);
    if dropped > 0 && sample.warning.is_none() {
        sample.warning = Some(format!("{dropped} malformed cards dropped"));
    }
    sample
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
