//! Cache Orchestrator - Unified Three-Tier Cache
//!
//! Single entry point over L1 (memory), L2 (shared key/value service) and
//! L3 (edge). Callers never see tier topology.
//!
//! # Read path
//!
//! L1, then L2, then L3 (edge-eligible content only). A lower-tier hit is
//! copied into the tiers above it unless the content type's policy is
//! `CACHE_ASIDE`. Lower-tier failures and timeouts count as misses.
//!
//! # Write path
//!
//! | policy          | L1   | L2 / L3                      |
//! |-----------------|------|------------------------------|
//! | `WRITE_THROUGH` | sync | sync, failures logged        |
//! | `READ_THROUGH`  | sync | sync, failures logged        |
//! | `WRITE_BACK`    | sync | background, best effort      |
//! | `CACHE_ASIDE`   | none | none (use `populate`)        |
//!
//! Only an L1 rejection fails a write.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use super::config::CacheConfig;
use super::key::{content_type_pattern, derive_key};
use super::l1::L1Cache;
use super::l2::L2Cache;
use super::l3::L3Cache;
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use super::model::{CachePolicy, CacheTier, ContentType};
use crate::domain::ports::MetricsSource;
use crate::error::{Error, Result};

// =============================================================================
// Reports
// =============================================================================

/// Outcome of a write across tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetReport {
    pub policy: CachePolicy,
    /// Tiers written synchronously
    pub written: Vec<CacheTier>,
    /// Tiers whose synchronous write failed (error or timeout)
    pub failed: Vec<CacheTier>,
    /// Tiers handed to a background write
    pub deferred: Vec<CacheTier>,
}

impl SetReport {
    fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            written: Vec::new(),
            failed: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// True when nothing was written or scheduled
    pub fn is_skipped(&self) -> bool {
        self.written.is_empty() && self.failed.is_empty() && self.deferred.is_empty()
    }

    /// True when no tier failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Liveness of each tier
#[derive(Debug, Clone, Serialize)]
pub struct TierHealth {
    pub l1_enabled: bool,
    pub l2_enabled: bool,
    pub l2_backend: Option<&'static str>,
    pub l2_degraded: bool,
    pub l3_enabled: bool,
    pub l3_healthy: bool,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Unified cache over all tiers
///
/// # Example
///
/// ```
/// use tiercache::cache::{CacheConfig, CacheOrchestrator, ContentType};
///
/// tokio_test::block_on(async {
///     let cache = CacheOrchestrator::in_memory(CacheConfig::default());
///     cache.set("ai_response:greeting", &b"hello"[..], ContentType::AiResponse).await.unwrap();
///
///     let value = cache.get("ai_response:greeting", ContentType::AiResponse).await;
///     assert_eq!(value.as_deref(), Some(&b"hello"[..]));
/// });
/// ```
pub struct CacheOrchestrator {
    config: CacheConfig,
    l1: Arc<L1Cache>,
    l2: Option<Arc<L2Cache>>,
    l3: Option<Arc<L3Cache>>,
    metrics: Arc<CacheMetrics>,
    pending: TaskTracker,
}

impl CacheOrchestrator {
    /// Compose from already-built lower tiers. L1 is built from `config`.
    pub fn with_tiers(config: CacheConfig, l2: Option<Arc<L2Cache>>, l3: Option<Arc<L3Cache>>) -> Self {
        Self {
            l1: Arc::new(L1Cache::from_config(&config.l1)),
            l2: l2.filter(|_| config.l2.enabled),
            l3: l3.filter(|_| config.l3.enabled),
            metrics: Arc::new(CacheMetrics::new()),
            pending: TaskTracker::new(),
            config,
        }
    }

    /// Compose with in-process L2/L3 backends for the enabled tiers
    pub fn in_memory(config: CacheConfig) -> Self {
        let l2 = config.l2.enabled.then(|| Arc::new(L2Cache::in_memory(&config)));
        let l3 = config.l3.enabled.then(|| Arc::new(L3Cache::in_memory(&config.l3)));
        Self::with_tiers(config, l2, l3)
    }

    /// Validate the config and connect the network tiers. An unreachable L2
    /// degrades to the in-process stand-in; an unhealthy L3 stays attached
    /// and is marked unhealthy.
    pub async fn connect(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let l2 = if config.l2.enabled {
            Some(Arc::new(L2Cache::initialize(&config).await))
        } else {
            None
        };
        let l3 = if config.l3.enabled {
            Some(Arc::new(L3Cache::initialize(&config.l3).await?))
        } else {
            None
        };

        let orchestrator = Self::with_tiers(config, l2, l3);
        info!(
            l1 = orchestrator.config.l1.enabled,
            l2 = orchestrator.l2.is_some(),
            l3 = orchestrator.l3.is_some(),
            "Cache orchestrator ready"
        );
        Ok(orchestrator)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn l1(&self) -> &Arc<L1Cache> {
        &self.l1
    }

    pub fn l2(&self) -> Option<&Arc<L2Cache>> {
        self.l2.as_ref()
    }

    pub fn l3(&self) -> Option<&Arc<L3Cache>> {
        self.l3.as_ref()
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Tiered lookup. Misses and absorbed tier failures both yield `None`.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str, content_type: ContentType) -> Option<Bytes> {
        let start = Instant::now();
        self.metrics.record_request();

        let value = self.lookup_tiers(key, content_type).await;

        if value.is_none() {
            self.metrics.record_final_miss();
        }
        self.metrics.record_request_latency(start.elapsed());
        value
    }

    async fn lookup_tiers(&self, key: &str, content_type: ContentType) -> Option<Bytes> {
        let backfill = self.config.policy_for(content_type).backfills_on_read();

        if self.config.l1.enabled {
            let started = Instant::now();
            if let Some(value) = self.l1.get(key) {
                self.metrics.record_hit(CacheTier::L1, started.elapsed());
                debug!(key, "Cache hit L1");
                return Some(value);
            }
            self.metrics.record_miss(CacheTier::L1, started.elapsed());
        }

        if let Some(l2) = &self.l2 {
            let started = Instant::now();
            match l2.get(key).await {
                Ok(Some(value)) => {
                    self.metrics.record_hit(CacheTier::L2, started.elapsed());
                    debug!(key, "Cache hit L2");
                    if backfill {
                        self.backfill_l1(key, &value, content_type);
                    }
                    return Some(value);
                }
                Ok(None) => self.metrics.record_miss(CacheTier::L2, started.elapsed()),
                Err(e) => {
                    self.metrics.record_miss(CacheTier::L2, started.elapsed());
                    self.metrics.record_error(CacheTier::L2);
                    warn!(key, error = %e, "L2 lookup failed, treating as miss");
                }
            }
        }

        if let Some(l3) = self.l3.as_ref().filter(|_| content_type.is_edge_eligible()) {
            let started = Instant::now();
            match l3.get(key).await {
                Ok(Some(value)) => {
                    self.metrics.record_hit(CacheTier::L3, started.elapsed());
                    debug!(key, "Cache hit L3");
                    if backfill {
                        self.backfill_l2(key, &value, content_type).await;
                        self.backfill_l1(key, &value, content_type);
                    }
                    return Some(value);
                }
                Ok(None) => self.metrics.record_miss(CacheTier::L3, started.elapsed()),
                Err(e) => {
                    self.metrics.record_miss(CacheTier::L3, started.elapsed());
                    self.metrics.record_error(CacheTier::L3);
                    warn!(key, error = %e, "L3 lookup failed, treating as miss");
                }
            }
        }

        None
    }

    fn backfill_l1(&self, key: &str, value: &Bytes, content_type: ContentType) {
        if let Some(ttl) = self.config.effective_ttl(content_type, CacheTier::L1) {
            if !self.l1.set(key, value.clone(), content_type, ttl) {
                debug!(key, "L1 backfill rejected");
            }
        }
    }

    async fn backfill_l2(&self, key: &str, value: &Bytes, content_type: ContentType) {
        let Some(l2) = &self.l2 else {
            return;
        };
        if let Some(ttl) = self.config.effective_ttl(content_type, CacheTier::L2) {
            if let Err(e) = l2.set(key, value, ttl).await {
                self.metrics.record_error(CacheTier::L2);
                warn!(key, error = %e, "L2 backfill failed");
            }
        }
    }

    /// Lookup, or compute and store on a total miss. Store failures are
    /// logged; the computed value is still returned.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, content_type: ContentType, compute: F) -> Result<Bytes>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes>>,
    {
        if let Some(value) = self.get(key, content_type).await {
            return Ok(value);
        }

        debug!(key, "Cache miss, computing");
        let value = compute().await?;
        if let Err(e) = self.set(key, value.clone(), content_type).await {
            warn!(key, error = %e, "Failed to cache computed value");
        }
        Ok(value)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Write according to the content type's policy
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: impl Into<Bytes>, content_type: ContentType) -> Result<SetReport> {
        let policy = self.config.policy_for(content_type);
        if policy == CachePolicy::CacheAside {
            debug!(key, "Cache-aside content, skipping implicit write");
            return Ok(SetReport::new(policy));
        }
        self.write(key, value.into(), content_type, policy).await
    }

    /// Explicit caller-driven write to every eligible tier, whatever the policy
    pub async fn populate(&self, key: &str, value: impl Into<Bytes>, content_type: ContentType) -> Result<SetReport> {
        self.write(key, value.into(), content_type, CachePolicy::WriteThrough).await
    }

    /// Bulk populate, returning how many entries were stored
    pub async fn warm<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, Bytes, ContentType)>,
    {
        let mut attempted = 0;
        let mut stored = 0;
        for (key, value, content_type) in entries {
            attempted += 1;
            match self.populate(&key, value, content_type).await {
                Ok(_) => stored += 1,
                Err(e) => warn!(key = %key, error = %e, "Cache warming failed for entry"),
            }
        }
        info!(stored, attempted, "Cache warming complete");
        stored
    }

    async fn write(&self, key: &str, value: Bytes, content_type: ContentType, policy: CachePolicy) -> Result<SetReport> {
        self.metrics.record_write();
        let mut report = SetReport::new(policy);

        if let Some(ttl) = self.config.effective_ttl(content_type, CacheTier::L1) {
            if !self.l1.set(key, value.clone(), content_type, ttl) {
                self.metrics.record_error(CacheTier::L1);
                return Err(Error::L1Rejected {
                    key: key.to_string(),
                    reason: "entry could not be sized or exceeds the L1 byte budget".into(),
                });
            }
            report.written.push(CacheTier::L1);
        }

        let l2 = self
            .l2
            .clone()
            .zip(self.config.effective_ttl(content_type, CacheTier::L2));
        let l3 = self
            .l3
            .clone()
            .zip(self.config.effective_ttl(content_type, CacheTier::L3));

        if policy == CachePolicy::WriteBack {
            if let Some((l2, ttl)) = l2 {
                self.spawn_l2_write(l2, key, value.clone(), ttl);
                report.deferred.push(CacheTier::L2);
            }
            if let Some((l3, ttl)) = l3 {
                self.spawn_l3_write(l3, key, value, ttl);
                report.deferred.push(CacheTier::L3);
            }
            return Ok(report);
        }

        let l2_write = async {
            match &l2 {
                Some((l2, ttl)) => Some(l2.set(key, &value, *ttl).await),
                None => None,
            }
        };
        let l3_write = async {
            match &l3 {
                Some((l3, ttl)) => Some(l3.set(key, value.clone(), *ttl).await),
                None => None,
            }
        };
        let (l2_result, l3_result) = tokio::join!(l2_write, l3_write);

        for (tier, result) in [(CacheTier::L2, l2_result), (CacheTier::L3, l3_result)] {
            match result {
                Some(Ok(())) => report.written.push(tier),
                Some(Err(e)) => {
                    self.metrics.record_error(tier);
                    warn!(key, tier = %tier, error = %e, "Synchronous tier write failed");
                    report.failed.push(tier);
                }
                None => {}
            }
        }

        Ok(report)
    }

    fn spawn_l2_write(&self, l2: Arc<L2Cache>, key: &str, value: Bytes, ttl: Duration) {
        let metrics = Arc::clone(&self.metrics);
        let key = key.to_string();
        self.pending.spawn(async move {
            if let Err(e) = l2.set(&key, &value, ttl).await {
                metrics.record_error(CacheTier::L2);
                warn!(key = %key, error = %e, "Write-back to L2 failed");
            }
        });
    }

    fn spawn_l3_write(&self, l3: Arc<L3Cache>, key: &str, value: Bytes, ttl: Duration) {
        let metrics = Arc::clone(&self.metrics);
        let key = key.to_string();
        self.pending.spawn(async move {
            if let Err(e) = l3.set(&key, value, ttl).await {
                metrics.record_error(CacheTier::L3);
                warn!(key = %key, error = %e, "Write-back to L3 failed");
            }
        });
    }

    /// Number of background writes still running
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every background write scheduled so far
    pub async fn flush_pending(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Remove a key from every enabled tier, lowest first so a concurrent
    /// read cannot backfill it again. Returns false if any tier failed.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> bool {
        let mut clean = true;

        if let Some(l3) = &self.l3 {
            if let Err(e) = l3.delete(key).await {
                self.metrics.record_error(CacheTier::L3);
                warn!(key, error = %e, "L3 delete failed");
                clean = false;
            }
        }
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.delete(key).await {
                self.metrics.record_error(CacheTier::L2);
                warn!(key, error = %e, "L2 delete failed");
                clean = false;
            }
        }
        self.l1.delete(key);

        clean
    }

    /// Wipe every tier. Returns false if any tier failed.
    pub async fn clear(&self) -> bool {
        let mut clean = self.l1.clear();

        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.clear("*").await {
                self.metrics.record_error(CacheTier::L2);
                warn!(error = %e, "L2 clear failed");
                clean = false;
            }
        }
        if let Some(l3) = &self.l3 {
            if let Err(e) = l3.purge("*").await {
                self.metrics.record_error(CacheTier::L3);
                warn!(error = %e, "L3 purge failed");
                clean = false;
            }
        }

        info!(clean, "Cache cleared");
        clean
    }

    /// Drop every key of one content type from all tiers. Returns false if
    /// any tier failed.
    pub async fn invalidate_content_type(&self, content_type: ContentType) -> bool {
        let pattern = content_type_pattern(content_type);
        let mut clean = true;

        if content_type.is_edge_eligible() {
            if let Some(l3) = &self.l3 {
                if let Err(e) = l3.purge(&pattern).await {
                    self.metrics.record_error(CacheTier::L3);
                    warn!(%pattern, error = %e, "L3 purge failed");
                    clean = false;
                }
            }
        }
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.clear(&pattern).await {
                self.metrics.record_error(CacheTier::L2);
                warn!(%pattern, error = %e, "L2 clear failed");
                clean = false;
            }
        }
        let dropped = self.l1.delete_prefix(pattern.trim_end_matches('*'));

        info!(content_type = %content_type, l1_dropped = dropped, clean, "Content type invalidated");
        clean
    }

    /// Invalidate edge copies matching a pattern
    pub async fn purge_edge(&self, pattern: &str) -> Result<u64> {
        match &self.l3 {
            Some(l3) => l3.purge(pattern).await,
            None => {
                debug!(pattern, "L3 disabled, nothing to purge");
                Ok(0)
            }
        }
    }

    // =========================================================================
    // Upstream API
    // =========================================================================

    /// Lookup by logical request
    pub async fn lookup<T: Serialize + ?Sized>(&self, content_type: ContentType, request: &T) -> Option<Bytes> {
        match derive_key(content_type, request) {
            Ok(key) => self.get(&key, content_type).await,
            Err(e) => {
                warn!(error = %e, "Could not derive cache key, treating as miss");
                None
            }
        }
    }

    /// Store by logical request
    pub async fn store<T: Serialize + ?Sized>(
        &self,
        content_type: ContentType,
        request: &T,
        value: impl Into<Bytes>,
    ) -> Result<SetReport> {
        let key = derive_key(content_type, request)?;
        self.set(&key, value, content_type).await
    }

    /// Invalidate by logical request
    pub async fn invalidate<T: Serialize + ?Sized>(&self, content_type: ContentType, request: &T) -> Result<bool> {
        let key = derive_key(content_type, request)?;
        Ok(self.delete(&key).await)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Administrative reset of the counters
    pub fn reset_metrics(&self) {
        self.metrics.reset();
        info!("Cache metrics reset");
    }

    pub fn tier_health(&self) -> TierHealth {
        TierHealth {
            l1_enabled: self.config.l1.enabled,
            l2_enabled: self.l2.is_some(),
            l2_backend: self.l2.as_ref().map(|l2| l2.backend_name()),
            l2_degraded: self.l2.as_ref().map(|l2| l2.is_degraded()).unwrap_or(false),
            l3_enabled: self.l3.is_some(),
            l3_healthy: self.l3.as_ref().map(|l3| l3.is_healthy()).unwrap_or(false),
        }
    }
}

impl MetricsSource for CacheOrchestrator {
    fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot(&self.l1.stats())
    }
}

// =============================================================================
// Tests
// =============================================================================
