//! Listing-card field parsing.
//!
//! Turns the raw text fields of a scraped card into a typed `Listing`.
//! Price text arrives in several currency/locale shapes; condition and
//! sold-date are best-effort with `Unknown`/`None` fallbacks. A card
//! yields a listing only if both title and price parse.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::driver::RawCard;
use crate::types::{Condition, Listing};

/// Decimal-separator convention of the surrounding page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleHint {
    /// `1,234.56`: dot decimal, comma grouping.
    DotDecimal,
    /// `1.234,56`: comma decimal, dot grouping.
    CommaDecimal,
}

impl LocaleHint {
    /// Derive the hint from a page `lang` attribute. Unknown or missing
    /// languages default to dot-decimal.
    pub fn from_lang(lang: Option<&str>) -> Self {
        let Some(lang) = lang else {
            return LocaleHint::DotDecimal;
        };
        let primary = lang
            .split(['-', '_'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        match primary.as_str() {
            "de" | "fr" | "es" | "it" | "pt" | "nl" | "pl" | "tr" => LocaleHint::CommaDecimal,
            _ => LocaleHint::DotDecimal,
        }
    }
}

/// Parse one raw card into a Listing. Returns None when the card is
/// malformed (missing title or unparseable price).
pub fn parse_card(card: &RawCard, locale: LocaleHint) -> Option<Listing> {
    let title = card.title.trim();
    if title.is_empty() {
        return None;
    }
    let price = parse_price(&card.price_text, locale)?;

    Some(Listing {
        title: title.to_string(),
        price,
        currency: detect_currency(&card.price_text),
        condition: parse_condition(&card.condition_text),
        sold_date: parse_sold_date(&card.sold_text),
        url: card.url.clone(),
    })
}

/// Extract the numeric portion of a price string.
///
/// Keeps digits and separators, interprets `,`/`.` per the locale hint,
/// and strips grouping separators. Ranges like "$40.00 to $55.00" take
/// the first number.
pub fn parse_price(text: &str, locale: LocaleHint) -> Option<Decimal> {
    // First run of digits-and-separators in the string.
    let numeric: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    if numeric.is_empty() {
        return None;
    }

    let (decimal_sep, group_sep) = match locale {
        LocaleHint::DotDecimal => ('.', ','),
        LocaleHint::CommaDecimal => (',', '.'),
    };

    let mut normalized: String = numeric
        .chars()
        .filter(|c| *c != group_sep)
        .map(|c| if c == decimal_sep { '.' } else { c })
        .collect();

    // A trailing separator ("1,234." after grouping removal) is noise.
    while normalized.ends_with('.') {
        normalized.pop();
    }

    Decimal::from_str(&normalized).ok().filter(|p| *p >= Decimal::ZERO)
}

/// Currency from the symbol or code in the price text. Defaults to USD.
fn detect_currency(text: &str) -> String {
    if text.contains('€') || text.contains("EUR") {
        "EUR".to_string()
    } else if text.contains('£') || text.contains("GBP") {
        "GBP".to_string()
    } else if text.contains("AU $") || text.contains("AUD") {
        "AUD".to_string()
    } else if text.contains("C $") || text.contains("CAD") {
        "CAD".to_string()
    } else {
        "USD".to_string()
    }
}

/// Condition by substring match against a fixed dictionary.
/// Checked most-specific first so "refurbished" never reads as new.
pub fn parse_condition(text: &str) -> Condition {
    let lower = text.to_lowercase();
    if lower.contains("refurb") {
        Condition::Refurbished
    } else if lower.contains("used") || lower.contains("pre-owned") || lower.contains("preowned") {
        Condition::Used
    } else if lower.contains("new") {
        Condition::New
    } else {
        Condition::Unknown
    }
}

/// Sold-date formats observed on listing cards.
const SOLD_DATE_FORMATS: &[&str] = &["%b %d, %Y", "%d %b %Y", "%Y-%m-%d", "%m/%d/%Y"];

/// Best-effort sold-date parse. Leading "Sold" markers are stripped.
pub fn parse_sold_date(text: &str) -> Option<NaiveDate> {
    let cleaned = text
        .trim()
        .trim_start_matches("Sold")
        .trim_start_matches("sold")
        .trim_start_matches("on")
        .trim();

    if cleaned.is_empty() {
        return None;
    }

    SOLD_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(cleaned, fmt).ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
