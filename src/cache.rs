//! Request-level recommendation cache.
//!
//! Keyed by the normalized query string, TTL-bounded, with single-flight
//! semantics: concurrent callers for the same key trigger exactly one
//! computation and all receive the leader's result. Expired entries are
//! recomputed on next access; nothing runs in the background. Errors are
//! never cached.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::types::{PricingError, Recommendation};

/// Result broadcast from a single-flight leader to its followers.
type FlightResult = Option<Result<Recommendation, String>>;

enum Slot {
    Ready {
        value: Recommendation,
        expires_at: DateTime<Utc>,
    },
    InFlight(watch::Receiver<FlightResult>),
}

/// Cache statistics exposed on the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

/// TTL cache with single-flight computation collapse.
pub struct RequestCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RequestCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Normalize a raw query into a cache key: lowercased, whitespace
    /// collapsed to single spaces.
    pub fn key_for(raw: &str) -> String {
        raw.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Look up `key`, or compute it via `compute`. Concurrent callers
    /// for the same key wait for the leader instead of recomputing.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<Recommendation, PricingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Recommendation, PricingError>>,
    {
        // Fast path / join path, retried if a leader fails or vanishes.
        loop {
            let mut rx = {
                let mut slots = self.slots.lock().await;
                match slots.get(key) {
                    Some(Slot::Ready { value, expires_at }) if *expires_at > Utc::now() => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key, "Cache hit");
                        return Ok(value.clone());
                    }
                    Some(Slot::InFlight(rx)) => rx.clone(),
                    _ => {
                        // Expired or absent: become the leader.
                        let (tx, rx) = watch::channel(None);
                        slots.insert(key.to_string(), Slot::InFlight(rx));
                        drop(slots);
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        return self.lead(key, tx, compute).await;
                    }
                }
            };

            // Follow the in-flight leader.
            match rx.changed().await {
                Ok(()) => {
                    let outcome = rx.borrow().clone();
                    match outcome {
                        Some(Ok(value)) => {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                            debug!(key, "Single-flight join");
                            return Ok(value);
                        }
                        Some(Err(message)) => {
                            // The leader failed; followers see the same
                            // error and the entry is gone for retries.
                            return Err(PricingError::Internal(message));
                        }
                        None => continue,
                    }
                }
                // Leader dropped without publishing: retry from scratch.
                Err(_) => continue,
            }
        }
    }

    async fn lead<F, Fut>(
        &self,
        key: &str,
        tx: watch::Sender<FlightResult>,
        compute: F,
    ) -> Result<Recommendation, PricingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Recommendation, PricingError>>,
    {
        let outcome = compute().await;

        let mut slots = self.slots.lock().await;
        match &outcome {
            Ok(value) => {
                slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        value: value.clone(),
                        expires_at: Utc::now() + self.ttl,
                    },
                );
                let _ = tx.send(Some(Ok(value.clone())));
            }
            Err(e) => {
                slots.remove(key);
                let _ = tx.send(Some(Err(e.to_string())));
            }
        }

        outcome
    }

    /// Drop every entry. Returns the number of ready entries cleared.
    pub async fn clear(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let ready = slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready { .. }))
            .count();
        slots.clear();
        ready
    }

    pub async fn stats(&self) -> CacheStats {
        let slots = self.slots.lock().await;
        CacheStats {
            size: slots.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
