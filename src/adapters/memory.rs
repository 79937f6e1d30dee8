//! In-Memory Tier Backends
//!
//! Deterministic implementations of the L2 and L3 ports. `InMemoryL2Client`
//! is also the local stand-in used when the shared key/value service cannot
//! be reached at startup.
//!
//! Both keep per-operation call counters and support injected failures and
//! latency, so tier behaviour can be asserted without a network.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;

use crate::cache::CacheTier;
use crate::domain::ports::{L2Client, L2ServerStats, L3Client};
use crate::error::{Error, Result};

/// Compile a key pattern (`*`, `?`, `[...]`); `*` also spans `:` and `/`
pub fn pattern_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)?.compile_matcher())
}

/// Call counters for a fake backend
#[derive(Debug, Default)]
pub struct CallCounters {
    pub gets: AtomicU64,
    pub sets: AtomicU64,
    pub deletes: AtomicU64,
    pub scans: AtomicU64,
    pub purges: AtomicU64,
}

impl CallCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Failure and latency injection shared by both fakes
#[derive(Debug, Default)]
struct Faults {
    failing: AtomicBool,
    delay: RwLock<Option<Duration>>,
}

impl Faults {
    async fn apply(&self, tier: CacheTier) -> Result<()> {
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::Connection {
                tier,
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    /// `None` when the TTL runs past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Bytes, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

// =============================================================================
// In-Memory L2
// =============================================================================

/// In-process stand-in for the shared key/value service
#[derive(Default)]
pub struct InMemoryL2Client {
    storage: DashMap<String, StoredValue>,
    calls: CallCounters,
    faults: Faults,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl InMemoryL2Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-operation call counters
    pub fn calls(&self) -> &CallCounters {
        &self.calls
    }

    pub fn get_calls(&self) -> u64 {
        self.calls.gets.load(Ordering::Relaxed)
    }

    pub fn set_calls(&self) -> u64 {
        self.calls.sets.load(Ordering::Relaxed)
    }

    /// Make every subsequent call fail with a connection error
    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::Relaxed);
    }

    /// Delay every subsequent call
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.faults.delay.write() = delay;
    }

    /// Raw stored bytes, bypassing counters and expiry
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        self.storage.get(key).map(|v| v.data.clone())
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl L2Client for InMemoryL2Client {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn ping(&self) -> Result<()> {
        self.faults.apply(CacheTier::L2).await
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        CallCounters::bump(&self.calls.gets);
        self.faults.apply(CacheTier::L2).await?;

        let expired = match self.storage.get(key) {
            Some(stored) if !stored.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(stored.data.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.storage.remove(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        CallCounters::bump(&self.calls.sets);
        self.faults.apply(CacheTier::L2).await?;
        self.storage.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        CallCounters::bump(&self.calls.deletes);
        self.faults.apply(CacheTier::L2).await?;
        Ok(keys.iter().filter(|k| self.storage.remove(k.as_str()).is_some()).count() as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        CallCounters::bump(&self.calls.scans);
        self.faults.apply(CacheTier::L2).await?;
        let matcher = pattern_matcher(pattern)?;
        Ok(self
            .storage
            .iter()
            .filter(|entry| !entry.value().is_expired() && matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        self.faults.apply(CacheTier::L2).await?;
        self.storage.clear();
        Ok(())
    }

    async fn server_stats(&self) -> Result<L2ServerStats> {
        self.faults.apply(CacheTier::L2).await?;
        Ok(L2ServerStats {
            connected_clients: 1,
            used_memory_bytes: self
                .storage
                .iter()
                .map(|entry| (entry.key().len() + entry.value().data.len()) as u64)
                .sum(),
            keyspace_hits: self.hits.load(Ordering::Relaxed),
            keyspace_misses: self.misses.load(Ordering::Relaxed),
            expired_keys: self.expired.load(Ordering::Relaxed),
            evicted_keys: 0,
            nodes: 1,
        })
    }
}

// =============================================================================
// In-Memory L3
// =============================================================================

/// In-process stand-in for the edge API
#[derive(Default)]
pub struct InMemoryL3Client {
    storage: DashMap<String, StoredValue>,
    calls: CallCounters,
    faults: Faults,
    unhealthy: AtomicBool,
}

impl InMemoryL3Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &CallCounters {
        &self.calls
    }

    pub fn get_calls(&self) -> u64 {
        self.calls.gets.load(Ordering::Relaxed)
    }

    pub fn set_calls(&self) -> u64 {
        self.calls.sets.load(Ordering::Relaxed)
    }

    pub fn set_failing(&self, failing: bool) {
        self.faults.failing.store(failing, Ordering::Relaxed);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.faults.delay.write() = delay;
    }

    /// Make the health endpoint report unhealthy
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::Relaxed);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.storage.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl L3Client for InMemoryL3Client {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn health(&self) -> Result<bool> {
        self.faults.apply(CacheTier::L3).await?;
        Ok(!self.unhealthy.load(Ordering::Relaxed))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        CallCounters::bump(&self.calls.gets);
        self.faults.apply(CacheTier::L3).await?;

        let live = self
            .storage
            .get(key)
            .filter(|stored| !stored.is_expired())
            .map(|stored| stored.data.clone());
        if live.is_none() {
            self.storage.remove(key);
        }
        Ok(live)
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        CallCounters::bump(&self.calls.sets);
        self.faults.apply(CacheTier::L3).await?;
        self.storage.insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        CallCounters::bump(&self.calls.deletes);
        self.faults.apply(CacheTier::L3).await?;
        Ok(self.storage.remove(key).is_some())
    }

    async fn purge(&self, pattern: &str) -> Result<u64> {
        CallCounters::bump(&self.calls.purges);
        self.faults.apply(CacheTier::L3).await?;

        let matcher = pattern_matcher(pattern)?;
        let before = self.storage.len();
        self.storage.retain(|key, _| !matcher.is_match(key));
        Ok((before - self.storage.len()) as u64)
    }
}
