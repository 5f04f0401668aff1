//! Scrape driver contract and the bundled HTTP implementation.
//!
//! The session manager only depends on the `ScrapeDriver` trait: open a
//! session, navigate to a query and extract listing cards, close. The
//! bundled `HttpDriver` fetches the marketplace's sold-listings search
//! page over plain HTTP and scans the returned markup for cards; a real
//! browser-automation driver can be slotted in behind the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

/// One listing card as extracted by the driver, fields still raw text.
#[derive(Debug, Clone, Default)]
pub struct RawCard {
    pub title: String,
    pub price_text: String,
    pub condition_text: String,
    pub sold_text: String,
    pub url: String,
}

/// The outcome of one navigation: full markup plus structured cards.
#[derive(Debug, Clone)]
pub struct ScrapePage {
    pub raw_html: String,
    pub cards: Vec<RawCard>,
    /// Page language attribute, used as the price-locale hint.
    pub locale_hint: Option<String>,
}

/// Abstraction over the marketplace scraping backend.
///
/// Implementors hold whatever session state they need (HTTP client,
/// browser context). All calls come from a single owning task, so
/// `&mut self` is fine and no internal locking is required.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScrapeDriver: Send {
    /// Open the session. Called once at process startup.
    async fn open(&mut self) -> Result<()>;

    /// Navigate to the search results for `query` and extract cards.
    async fn navigate_and_extract(&mut self, query: &str) -> Result<ScrapePage>;

    /// Close the session. Called once at shutdown.
    async fn close(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP driver
// ---------------------------------------------------------------------------

/// Card markup markers for the marketplace search page.
const CARD_MARKER: &str = "s-item__wrapper";
const TITLE_MARKER: &str = "s-item__title";
const PRICE_MARKER: &str = "s-item__price";
const CONDITION_MARKER: &str = "s-item__condition";
const SOLD_MARKER: &str = "s-item__sold-date";
const LINK_MARKER: &str = "s-item__link\" href=\"";

/// Plain-HTTP implementation of the driver contract.
///
/// Fetches the sold-listings search page and extracts cards by marker
/// scanning. Good enough for markets that serve listings server-side;
/// pages requiring script execution need a browser-backed driver.
pub struct HttpDriver {
    base_url: String,
    timeout: std::time::Duration,
    http: Option<Client>,
}

impl HttpDriver {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            http: None,
        }
    }

    /// Build the sold-listings search URL for a query.
    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?_nkw={}&LH_Sold=1&LH_Complete=1",
            self.base_url,
            urlencoding::encode(query),
        )
    }
}

#[async_trait]
impl ScrapeDriver for HttpDriver {
    async fn open(&mut self) -> Result<()> {
        let http = Client::builder()
            .timeout(self.timeout)
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) pricelens/0.1.0")
            .build()
            .context("Failed to build HTTP client for scrape driver")?;
        self.http = Some(http);
        Ok(())
    }

    async fn navigate_and_extract(&mut self, query: &str) -> Result<ScrapePage> {
        let http = self
            .http
            .as_ref()
            .context("Driver not opened — call open() first")?;

        let url = self.search_url(query);
        debug!(url = %url, "Fetching marketplace search page");

        let resp = http
            .get(&url)
            .send()
            .await
            .context("Marketplace request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Marketplace returned {status} for search page");
        }

        let html = resp
            .text()
            .await
            .context("Failed to read marketplace response body")?;

        if !html.contains(CARD_MARKER) {
            // The results container never rendered: treat as a failed
            // navigation rather than an empty result set.
            anyhow::bail!("Search results root not found in page");
        }

        let cards = extract_cards(&html);
        if cards.is_empty() {
            warn!(query, "Results container present but no cards extracted");
        }

        let locale_hint = extract_lang(&html);
        Ok(ScrapePage {
            cards,
            locale_hint,
            raw_html: html,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.http = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Markup scanning
// ---------------------------------------------------------------------------

/// Extract all listing cards from the page markup.
fn extract_cards(html: &str) -> Vec<RawCard> {
    let mut cards = Vec::new();
    let mut rest = html;

    while let Some(start) = rest.find(CARD_MARKER) {
        let after = &rest[start + CARD_MARKER.len()..];
        let end = after.find(CARD_MARKER).unwrap_or(after.len());
        let segment = &after[..end];

        cards.push(RawCard {
            title: text_after(segment, TITLE_MARKER).unwrap_or_default(),
            price_text: text_after(segment, PRICE_MARKER).unwrap_or_default(),
            condition_text: text_after(segment, CONDITION_MARKER).unwrap_or_default(),
            sold_text: text_after(segment, SOLD_MARKER).unwrap_or_default(),
            url: attr_after(segment, LINK_MARKER).unwrap_or_default(),
        });

        rest = after;
    }

    cards
}

/// Text content following a class marker: skips to the closing `>` of
/// the element carrying the marker, then collects until the next `<`.
fn text_after(segment: &str, marker: &str) -> Option<String> {
    let at = segment.find(marker)?;
    let after = &segment[at + marker.len()..];
    let open_end = after.find('>')?;
    let content = &after[open_end + 1..];
    let close = content.find('<').unwrap_or(content.len());
    let text = content[..close].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Attribute value following a marker that ends right at the value.
fn attr_after(segment: &str, marker: &str) -> Option<String> {
    let at = segment.find(marker)?;
    let after = &segment[at + marker.len()..];
    let close = after.find('"')?;
    let value = &after[..close];
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Page language from the `lang="…"` attribute, if present.
fn extract_lang(html: &str) -> Option<String> {
    attr_after(html, "lang=\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
