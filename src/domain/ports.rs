//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache tiers and the monitoring layer depend on.
//! Infrastructure adapters implement these traits to provide the concrete
//! network clients and the in-memory doubles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Cache Layer                            │
//! │      L2Cache ──► L2Client        L3Cache ──► L3Client        │
//! │      Optimizer / HealthMonitor ──► MetricsSource             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  RedisStore │ EdgeHttpClient │ InMemoryL2Client │ InMemoryL3 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::cache::metrics::CacheMetricsSnapshot;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Server-side counters reported by the shared key/value service.
/// In cluster mode these are summed across nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct L2ServerStats {
    pub connected_clients: u64,
    pub used_memory_bytes: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub expired_keys: u64,
    pub evicted_keys: u64,
    /// Number of nodes that answered
    pub nodes: usize,
}

impl L2ServerStats {
    /// Server-side hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.keyspace_hits + self.keyspace_misses;
        if total == 0 {
            0.0
        } else {
            self.keyspace_hits as f64 / total as f64
        }
    }

    /// Sum another node's counters into this one
    pub fn merge(&mut self, other: &L2ServerStats) {
        self.connected_clients += other.connected_clients;
        self.used_memory_bytes += other.used_memory_bytes;
        self.keyspace_hits += other.keyspace_hits;
        self.keyspace_misses += other.keyspace_misses;
        self.expired_keys += other.expired_keys;
        self.evicted_keys += other.evicted_keys;
        self.nodes += other.nodes;
    }
}

// =============================================================================
// Port Traits
// =============================================================================

/// Client for the shared key/value service backing L2.
///
/// Values are opaque byte strings; framing and compression happen above.
#[async_trait]
pub trait L2Client: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Round-trip check
    async fn ping(&self) -> Result<()>;

    /// Fetch a value
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a value and its expiry in one atomic command
    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<u64>;

    /// All keys matching a glob pattern (`*`, `?`)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>>;

    /// Drop every key
    async fn flush(&self) -> Result<()>;

    /// Server-side counters
    async fn server_stats(&self) -> Result<L2ServerStats>;
}

/// Client for the edge/CDN API backing L3.
#[async_trait]
pub trait L3Client: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Whether the edge API is reachable and healthy
    async fn health(&self) -> Result<bool>;

    /// Fetch an object
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store an object with a cache lifetime
    async fn put(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete an object, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Invalidate all objects matching a glob pattern, returning the count
    async fn purge(&self, pattern: &str) -> Result<u64>;
}

/// Anything that can produce a point-in-time view of cache counters.
pub trait MetricsSource: Send + Sync {
    fn metrics_snapshot(&self) -> CacheMetricsSnapshot;
}
