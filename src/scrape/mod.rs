//! Marketplace scraping.
//!
//! Defines the `ScrapeDriver` contract, the card-field parsers, and the
//! `SessionManager` actor that serializes all fetches through the one
//! long-lived driver session.

pub mod driver;
pub mod parse;
pub mod session;

pub use driver::{HttpDriver, RawCard, ScrapeDriver, ScrapePage};
pub use session::{ScrapeConfig, SessionManager};
