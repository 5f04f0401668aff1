//! Query validation and UPC classification.
//!
//! Canonicalizes raw input, checksum-verifies UPC-A/UPC-E codes, and
//! classifies everything else as a free-text descriptor.

use crate::types::{PricingError, Query, QueryKind};

/// Classify a raw query string.
///
/// Whitespace and dashes are stripped before digit inspection. A
/// 12-digit string with a valid mod-10 checksum is a UPC-A; an 8-digit
/// string is treated as UPC-E and checked with the UPC-A rule applied
/// to its 8 digits directly, without the canonical UPC-E expansion
/// (matches the upstream pricing system, see DESIGN.md). Anything else
/// is free text.
///
/// Fails only on empty or whitespace-only input.
pub fn classify(raw: &str) -> Result<Query, PricingError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PricingError::InvalidQuery(
            "query must not be empty".to_string(),
        ));
    }

    let stripped: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    let all_digits = !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit());
    if all_digits && (stripped.len() == 12 || stripped.len() == 8) && checksum_ok(&stripped) {
        return Ok(Query {
            raw: raw.to_string(),
            kind: QueryKind::Upc,
            canonical: stripped,
        });
    }

    Ok(Query {
        raw: raw.to_string(),
        kind: QueryKind::FreeText,
        canonical: trimmed.to_string(),
    })
}

/// Mod-10 check over all digits including the trailing check digit:
/// sum(3 × odd-position digits) + sum(even-position digits) ≡ 0 (mod 10),
/// positions 1-indexed from the left.
fn checksum_ok(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let digit = c.to_digit(10).unwrap_or(0);
            // i is 0-based, so even i is an odd (1-indexed) position.
            if i % 2 == 0 {
                digit * 3
            } else {
                digit
            }
        })
        .sum();

    sum % 10 == 0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
