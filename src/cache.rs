//! Small in-memory cache for backend reads.
//!
//! Keyed by string, TTL-bounded, with prefix invalidation so a completed
//! purchase can drop every cached order/pending-payment view at once.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Well-known cache key prefixes.
pub mod keys {
    pub const ORDERS: &str = "orders";
    pub const PENDING_PAYMENTS: &str = "payments:pending";
    pub const SERVER_CART: &str = "cart:server";
}

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
}

pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl QueryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() > self.default_ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        debug!(
            prefix = %prefix,
            dropped = before - self.entries.len(),
            "cache invalidation"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
