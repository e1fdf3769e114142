//! Short-lived memo of fetched marker rows per (client, region, date).
//!
//! Only saves a round-trip when the workflow view and the reporting view
//! are requested back to back. Correctness never depends on a hit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::normalize::ClientRegion;
use crate::origin::MarkerRow;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub client: String,
    pub region: String,
    pub business_date: NaiveDate,
}

impl CacheKey {
    pub fn new(pair: &ClientRegion, business_date: NaiveDate) -> Self {
        Self {
            client: pair.client.clone(),
            region: pair.region.clone(),
            business_date,
        }
    }
}

pub trait RowCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Arc<Vec<MarkerRow>>>;
    fn put(&self, key: CacheKey, rows: Arc<Vec<MarkerRow>>, ttl: Duration);
}

struct Entry {
    rows: Arc<Vec<MarkerRow>>,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

/// In-process [`RowCache`]. Expired entries are evicted on read, and every
/// `put` sweeps out the rest.
#[derive(Default)]
pub struct TtlRowCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl TtlRowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RowCache for TtlRowCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<Vec<MarkerRow>>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let expired = entries.get(key)?.is_expired(Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| Arc::clone(&entry.rows))
    }

    fn put(&self, key: CacheKey, rows: Arc<Vec<MarkerRow>>, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.insert(
            key,
            Entry {
                rows,
                stored_at: now,
                ttl,
            },
        );
    }
}
