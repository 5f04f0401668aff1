//! Internal historical-sales data.
//!
//! A pluggable `InternalStore` loads records once at startup; the
//! `Matcher` serves all match queries from the immutable in-memory view.

pub mod matcher;
pub mod store;

pub use matcher::{MatchOutcome, Matcher};
pub use store::{CsvStore, InternalStore, SqliteStore};
