//! L1 Cache - In-Process Memory Tier
//!
//! Fastest tier, bounded by both item count and total bytes.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` per instance guards the entry map, the access
//!   order and the byte accounting together
//! - Access order is a `BTreeMap<tick, key>`: the first entry is the least
//!   recently used, a hit re-inserts the key under a fresh tick
//! - Capacity is enforced before insertion, byte budget first, then items
//! - Expired entries are dropped lazily on access and by `purge_expired`

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, warn};

use super::config::L1Config;
use super::model::{CacheEntry, ContentType};

struct Slot {
    entry: CacheEntry,
    tick: u64,
}

#[derive(Default)]
struct L1State {
    entries: HashMap<String, Slot>,
    /// tick -> key, ascending = least to most recently used
    order: BTreeMap<u64, String>,
    next_tick: u64,
    current_bytes: u64,
}

impl L1State {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.tick);
        self.current_bytes = self.current_bytes.saturating_sub(slot.entry.size_bytes());
        Some(slot.entry)
    }

    fn pop_lru(&mut self) -> Option<CacheEntry> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.current_bytes = self.current_bytes.saturating_sub(slot.entry.size_bytes());
        Some(slot.entry)
    }
}

/// L1 Cache - bounded in-memory LRU
pub struct L1Cache {
    state: Mutex<L1State>,
    max_items: usize,
    max_bytes: u64,
    default_ttl: Duration,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl L1Cache {
    /// Create an L1 cache with explicit budgets
    pub fn new(max_items: usize, max_bytes: u64, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(L1State::default()),
            max_items: max_items.max(1),
            max_bytes,
            default_ttl,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Create from configuration
    pub fn from_config(config: &L1Config) -> Self {
        Self::new(config.max_items, config.max_bytes(), config.default_ttl())
    }

    /// Bytes charged for storing `value` under `key`
    pub fn estimate_size(key: &str, value: &[u8]) -> Option<u64> {
        (key.len() as u64).checked_add(value.len() as u64)
    }

    /// Get a value. Expired entries are removed and reported as a miss; a hit
    /// bumps the access count and moves the key to the most-recent end.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            None => return None,
            Some(slot) => slot.entry.is_expired(),
        };
        if expired {
            state.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(key, "L1 entry expired on access");
            return None;
        }

        let tick = state.bump();
        let slot = state.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut slot.tick, tick);
        slot.entry.record_access();
        let value = slot.entry.value().clone();

        if let Some(owned_key) = state.order.remove(&old_tick) {
            state.order.insert(tick, owned_key);
        }

        Some(value)
    }

    /// Store a value. A zero `ttl` uses the configured default. Returns false
    /// (and logs) when the entry cannot be sized or can never fit.
    pub fn set(&self, key: &str, value: Bytes, content_type: ContentType, ttl: Duration) -> bool {
        let size = match Self::estimate_size(key, &value) {
            Some(size) => size,
            None => {
                error!(key, "L1 size estimation failed, write rejected");
                return false;
            }
        };

        if size > self.max_bytes {
            warn!(key, size, max_bytes = self.max_bytes, "L1 entry exceeds byte budget, write rejected");
            return false;
        }

        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let entry = CacheEntry::new(key, value, content_type, ttl, size);

        let mut state = self.state.lock();
        state.remove(key);
        self.enforce_capacity(&mut state, size);

        let tick = state.bump();
        state.order.insert(tick, key.to_string());
        state.entries.insert(key.to_string(), Slot { entry, tick });
        state.current_bytes += size;

        true
    }

    /// Evict from the LRU end until `incoming` bytes and one more item fit
    fn enforce_capacity(&self, state: &mut L1State, incoming: u64) {
        while state.current_bytes + incoming > self.max_bytes {
            match state.pop_lru() {
                Some(evicted) => self.record_eviction(&evicted, "bytes"),
                None => break,
            }
        }
        while state.entries.len() >= self.max_items {
            match state.pop_lru() {
                Some(evicted) => self.record_eviction(&evicted, "items"),
                None => break,
            }
        }
    }

    fn record_eviction(&self, entry: &CacheEntry, budget: &'static str) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(key = entry.key(), budget, "L1 evicted least recently used entry");
    }

    /// Remove one entry
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Drop every entry and release accounted bytes
    pub fn clear(&self) -> bool {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
        state.current_bytes = 0;
        true
    }

    /// Remove every key starting with `prefix`, returning how many were dropped
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut state = self.state.lock();
        let matching: Vec<String> = state.entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        for key in &matching {
            state.remove(key);
        }
        matching.len()
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock();

        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, slot)| slot.entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        self.expirations.fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Check for a live entry without touching recency
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|slot| !slot.entry.is_expired())
            .unwrap_or(false)
    }

    /// Copy of an entry without touching recency
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).map(|slot| slot.entry.clone())
    }

    /// Keys from least to most recently used
    pub fn lru_order(&self) -> Vec<String> {
        self.state.lock().order.values().cloned().collect()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accounted bytes
    pub fn size_bytes(&self) -> u64 {
        self.state.lock().current_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Capacity evictions since creation
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries dropped because their TTL ran out
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }
}

/// L1 cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct L1Stats {
    /// Number of entries
    pub items: usize,
    /// Item budget
    pub max_items: usize,
    /// Accounted bytes
    pub current_bytes: u64,
    /// Byte budget
    pub max_bytes: u64,
    /// current_bytes / max_bytes (0.0 - 1.0)
    pub utilization: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

impl L1Cache {
    /// Get cache statistics
    pub fn stats(&self) -> L1Stats {
        let state = self.state.lock();
        let created = state.entries.values().map(|slot| slot.entry.created_at());

        let (oldest, newest) = created.fold((None, None), |(lo, hi): (Option<DateTime<Utc>>, Option<DateTime<Utc>>), ts| {
            (
                Some(lo.map_or(ts, |lo| lo.min(ts))),
                Some(hi.map_or(ts, |hi| hi.max(ts))),
            )
        });

        L1Stats {
            items: state.entries.len(),
            max_items: self.max_items,
            current_bytes: state.current_bytes,
            max_bytes: self.max_bytes,
            utilization: if self.max_bytes == 0 {
                0.0
            } else {
                state.current_bytes as f64 / self.max_bytes as f64
            },
            evictions: self.evictions(),
            expirations: self.expirations(),
            oldest_entry: oldest,
            newest_entry: newest,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
