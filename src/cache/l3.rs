//! L3 Cache - Edge Tier
//!
//! Large, rarely-changing, non-sensitive payloads held at the edge.
//!
//! # Design
//!
//! - Pluggable `L3Client` (HTTP edge API, or in-memory for tests)
//! - Values are always fully materialized blobs
//! - A health flag is set by the startup health check and refreshed by every call

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{info, warn};

use super::config::L3Config;
use super::model::CacheTier;
use crate::adapters::{EdgeHttpClient, InMemoryL3Client};
use crate::domain::ports::L3Client;
use crate::error::{Error, Result};

/// L3 Cache - deadline-bounded access to an `L3Client`
pub struct L3Cache {
    client: Arc<dyn L3Client>,
    default_ttl: Duration,
    timeout: Duration,
    healthy: AtomicBool,
}

impl L3Cache {
    /// Create over an explicit client
    pub fn new(client: Arc<dyn L3Client>, config: &L3Config) -> Self {
        Self {
            client,
            default_ttl: config.default_ttl(),
            timeout: config.timeout(),
            healthy: AtomicBool::new(true),
        }
    }

    /// Create with in-memory backend (for testing)
    pub fn in_memory(config: &L3Config) -> Self {
        Self::new(Arc::new(InMemoryL3Client::new()), config)
    }

    /// Build the HTTP client and check the edge API. A failed check leaves
    /// the tier marked unhealthy; it is never fatal.
    pub async fn initialize(config: &L3Config) -> Result<Self> {
        let cache = Self::new(Arc::new(EdgeHttpClient::new(config)?), config);
        let healthy = cache.check_health().await;
        info!(endpoint = %config.endpoint, healthy, "L3 cache initialized");
        Ok(cache)
    }

    /// Check the edge API and record the result
    pub async fn check_health(&self) -> bool {
        let healthy = match self.bounded("health", self.client.health()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "L3 health check failed");
                false
            }
        };
        self.healthy.store(healthy, Ordering::Relaxed);
        healthy
    }

    /// Last observed health
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.name()
    }

    async fn bounded<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                tier: CacheTier::L3,
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };
        self.healthy.store(result.is_ok(), Ordering::Relaxed);
        result
    }

    /// Fetch an object
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.bounded("get", self.client.get(key)).await
    }

    /// Store an object. A zero `ttl` uses the configured default.
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        self.bounded("set", self.client.put(key, value, ttl)).await
    }

    /// Remove an object
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.bounded("delete", self.client.delete(key)).await
    }

    /// Invalidate edge copies globally; `"*"` purges everything
    pub async fn purge(&self, pattern: &str) -> Result<u64> {
        let purged = self.bounded("purge", self.client.purge(pattern)).await?;
        info!(pattern, purged, "L3 edge cache purged");
        Ok(purged)
    }
}
