//! Cache Metrics Collection
//!
//! Cumulative counters owned by one orchestrator instance. Nothing here is
//! process-global; counters live until the owner is dropped or `reset` is
//! called explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::l1::L1Stats;
use super::model::CacheTier;

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    latency_us: AtomicU64,
    errors: AtomicU64,
}

impl TierCounters {
    fn snapshot(&self) -> TierSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        TierSnapshot {
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: ratio(hits, lookups),
            avg_latency_ms: self.latency_us.load(Ordering::Relaxed) as f64 / 1000.0 / lookups.max(1) as f64,
        }
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.latency_us.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    total_requests: AtomicU64,
    final_misses: AtomicU64,
    total_latency_us: AtomicU64,
    write_operations: AtomicU64,
    errors: AtomicU64,
    tiers: [TierCounters; 3],
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, tier: CacheTier) -> &TierCounters {
        match tier {
            CacheTier::L1 => &self.tiers[0],
            CacheTier::L2 => &self.tiers[1],
            CacheTier::L3 => &self.tiers[2],
        }
    }

    /// A lookup entered the cache
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// End-to-end duration of one lookup
    pub fn record_request_latency(&self, elapsed: Duration) {
        self.total_latency_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_hit(&self, tier: CacheTier, elapsed: Duration) {
        let counters = self.tier(tier);
        counters.hits.fetch_add(1, Ordering::Relaxed);
        counters.latency_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self, tier: CacheTier, elapsed: Duration) {
        let counters = self.tier(tier);
        counters.misses.fetch_add(1, Ordering::Relaxed);
        counters.latency_us.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// A lookup that found nothing in any tier
    pub fn record_final_miss(&self) {
        self.final_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.write_operations.fetch_add(1, Ordering::Relaxed);
    }

    /// An absorbed or propagated tier failure
    pub fn record_error(&self, tier: CacheTier) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        self.tier(tier).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn hits(&self, tier: CacheTier) -> u64 {
        self.tier(tier).hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self, tier: CacheTier) -> u64 {
        self.tier(tier).misses.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn write_operations(&self) -> u64 {
        self.write_operations.load(Ordering::Relaxed)
    }

    /// Hits summed over all tiers
    pub fn total_hits(&self) -> u64 {
        self.tiers.iter().map(|t| t.hits.load(Ordering::Relaxed)).sum()
    }

    /// Fraction of lookups answered by any tier
    pub fn hit_rate(&self) -> f64 {
        ratio(self.total_hits(), self.total_requests())
    }

    /// Average end-to-end lookup latency
    pub fn avg_latency_ms(&self) -> f64 {
        self.total_latency_us.load(Ordering::Relaxed) as f64 / 1000.0 / self.total_requests().max(1) as f64
    }

    /// Administrative reset of every counter
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.final_misses.store(0, Ordering::Relaxed);
        self.total_latency_us.store(0, Ordering::Relaxed);
        self.write_operations.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        for tier in &self.tiers {
            tier.reset();
        }
    }

    /// Get snapshot of all metrics, combined with L1 occupancy
    pub fn snapshot(&self, l1: &L1Stats) -> CacheMetricsSnapshot {
        let total_requests = self.total_requests();
        let errors = self.errors();

        CacheMetricsSnapshot {
            timestamp: Utc::now(),
            total_requests,
            total_hits: self.total_hits(),
            total_misses: self.final_misses.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            avg_latency_ms: self.avg_latency_ms(),
            write_operations: self.write_operations(),
            errors,
            error_rate: ratio(errors, total_requests.max(1)),
            l1: self.tiers[0].snapshot(),
            l2: self.tiers[1].snapshot(),
            l3: self.tiers[2].snapshot(),
            l1_items: l1.items as u64,
            l1_memory_bytes: l1.current_bytes,
            l1_memory_limit_bytes: l1.max_bytes,
            l1_evictions: l1.evictions,
            l1_expirations: l1.expirations,
        }
    }
}

/// Per-tier view inside a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_requests: u64,
    pub total_hits: u64,
    /// Lookups that missed every tier
    pub total_misses: u64,
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
    pub write_operations: u64,
    pub errors: u64,
    pub error_rate: f64,
    pub l1: TierSnapshot,
    pub l2: TierSnapshot,
    pub l3: TierSnapshot,
    pub l1_items: u64,
    pub l1_memory_bytes: u64,
    pub l1_memory_limit_bytes: u64,
    /// Cumulative L1 capacity evictions
    pub l1_evictions: u64,
    pub l1_expirations: u64,
}

impl CacheMetricsSnapshot {
    pub fn memory_usage_mb(&self) -> f64 {
        self.l1_memory_bytes as f64 / MB
    }

    pub fn memory_limit_mb(&self) -> f64 {
        self.l1_memory_limit_bytes as f64 / MB
    }
}
