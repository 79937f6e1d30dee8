//! L2 Cache - Shared Key/Value Tier
//!
//! Cache shared across process instances through an `L2Client`. Adds value
//! framing, opportunistic compression and a deadline on every call.
//!
//! # Design
//!
//! - Values above the compression threshold are compressed when that
//!   actually shrinks them, and carry the `COMPRESSED:` marker on the wire
//! - Expiry is always written atomically with the value
//! - If the service cannot be reached at startup, an in-process stand-in is
//!   used and the tier reports itself as degraded

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::compression::CompressionManager;
use super::config::CacheConfig;
use super::model::CacheTier;
use crate::adapters::{InMemoryL2Client, RedisStore};
use crate::domain::ports::{L2Client, L2ServerStats};
use crate::error::{Error, Result};

const DELETE_BATCH: usize = 500;

/// L2 statistics
#[derive(Debug, Clone, Serialize)]
pub struct L2Stats {
    /// Backend in use
    pub backend: &'static str,
    /// True when running on the local stand-in
    pub degraded: bool,
    /// Writes stored compressed
    pub compressed_writes: u64,
    /// Counters reported by the service
    pub server: L2ServerStats,
}

/// L2 Cache - framed, compressed, deadline-bounded access to an `L2Client`
pub struct L2Cache {
    client: Arc<dyn L2Client>,
    compression: CompressionManager,
    default_ttl: Duration,
    timeout: Duration,
    degraded: AtomicBool,
    compressed_writes: AtomicU64,
}

impl L2Cache {
    /// Create over an explicit client
    pub fn new(client: Arc<dyn L2Client>, config: &CacheConfig) -> Self {
        Self {
            client,
            compression: CompressionManager::new(config.compression_enabled, config.compression_threshold_bytes),
            default_ttl: config.l2.default_ttl(),
            timeout: config.l2.timeout(),
            degraded: AtomicBool::new(false),
            compressed_writes: AtomicU64::new(0),
        }
    }

    /// Create over a fresh in-process backend
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(InMemoryL2Client::new()), config)
    }

    /// Connect to the configured service, substituting the in-process
    /// stand-in when it cannot be reached
    pub async fn initialize(config: &CacheConfig) -> Self {
        let deadline = config.l2.timeout() * 2;
        let connected = match tokio::time::timeout(deadline, RedisStore::connect(&config.l2)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                tier: CacheTier::L2,
                operation: "connect",
                timeout_ms: deadline.as_millis() as u64,
            }),
        };

        match connected {
            Ok(client) => {
                info!(endpoint = %config.l2.endpoint, "L2 cache initialized");
                Self::new(Arc::new(client), config)
            }
            Err(e) => {
                warn!(
                    endpoint = %config.l2.endpoint,
                    error = %e,
                    "L2 service unreachable, falling back to in-process stand-in"
                );
                let cache = Self::in_memory(config);
                cache.degraded.store(true, Ordering::Relaxed);
                cache
            }
        }
    }

    /// Whether the tier runs on the local stand-in
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn backend_name(&self) -> &'static str {
        self.client.name()
    }

    /// Deadline applied to each call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                tier: CacheTier::L2,
                operation,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Fetch and decode a value
    pub async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let raw = self.bounded("get", self.client.get(key)).await?;
        Ok(raw.map(|raw| self.compression.decode(&raw)))
    }

    /// Encode and store a value. A zero `ttl` uses the configured default.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let (framed, compressed) = self.compression.encode(value);
        if compressed {
            self.compressed_writes.fetch_add(1, Ordering::Relaxed);
            debug!(key, original = value.len(), stored = framed.len(), "L2 value compressed");
        }
        self.bounded("set", self.client.set_with_expiry(key, framed, ttl)).await
    }

    /// Remove one key
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.bounded("delete", self.client.delete(&[key.to_string()])).await?;
        Ok(removed > 0)
    }

    /// Remove keys matching a glob pattern; `"*"` flushes everything
    pub async fn clear(&self, pattern: &str) -> Result<()> {
        if pattern == "*" {
            self.bounded("flush", self.client.flush()).await?;
            info!("L2 cache flushed");
            return Ok(());
        }

        let keys = self.bounded("scan", self.client.scan(pattern)).await?;
        let mut removed = 0;
        for batch in keys.chunks(DELETE_BATCH) {
            removed += self.bounded("delete", self.client.delete(batch)).await?;
        }
        info!(pattern, matched = keys.len(), removed, "L2 keys cleared");
        Ok(())
    }

    /// Statistics, including the service's own counters
    pub async fn stats(&self) -> Result<L2Stats> {
        let server = self.bounded("info", self.client.server_stats()).await?;
        Ok(L2Stats {
            backend: self.client.name(),
            degraded: self.is_degraded(),
            compressed_writes: self.compressed_writes.load(Ordering::Relaxed),
            server,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::compression::COMPRESSED_MARKER;
    use assert_matches::assert_matches;

    fn setup(threshold: usize) -> (Arc<InMemoryL2Client>, L2Cache) {
        let backend = Arc::new(InMemoryL2Client::new());
        let config = CacheConfig {
            compression_threshold_bytes: threshold,
            ..Default::default()
        };
        let cache = L2Cache::new(backend.clone(), &config);
        (backend, cache)
    }

    #[tokio::test]
    async fn test_small_value_stored_raw() {
        let (backend, cache) = setup(1024);

        cache.set("k", b"small", Duration::from_secs(60)).await.unwrap();
        assert_eq!(backend.raw("k").unwrap().as_ref(), b"small");
        assert_eq!(cache.get("k").await.unwrap().unwrap().as_ref(), b"small");
    }

    #[tokio::test]
    async fn test_large_value_compressed_on_wire() {
        let (backend, cache) = setup(64);
        let value = b"transcript segment repeated ".repeat(40);

        cache.set("k", &value, Duration::from_secs(60)).await.unwrap();

        let raw = backend.raw("k").unwrap();
        assert!(raw.starts_with(COMPRESSED_MARKER));
        assert!(raw.len() < value.len());
        assert_eq!(cache.get("k").await.unwrap().unwrap().as_ref(), value.as_slice());
        assert_eq!(cache.stats().await.unwrap().compressed_writes, 1);
    }

    #[tokio::test]
    async fn test_undecodable_marker_payload_returns_raw() {
        let (backend, cache) = setup(64);
        backend
            .set_with_expiry("k", Bytes::from_static(b"COMPRESSED:garbage"), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.unwrap().unwrap().as_ref(), b"garbage");
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let backend = Arc::new(InMemoryL2Client::new());
        let mut config = CacheConfig::default();
        config.l2.timeout_ms = 20;
        let cache = L2Cache::new(backend.clone(), &config);

        backend.set_delay(Some(Duration::from_millis(200)));
        let err = cache.get("k").await.unwrap_err();
        assert_matches!(err, Error::Timeout { tier: CacheTier::L2, operation: "get", timeout_ms: 20 });
    }

    #[tokio::test]
    async fn test_clear_pattern_and_all() {
        let (backend, cache) = setup(1024);
        for key in ["ai_response:1", "ai_response:2", "user_session:1"] {
            cache.set(key, b"v", Duration::from_secs(60)).await.unwrap();
        }

        cache.clear("ai_response:*").await.unwrap();
        assert_eq!(backend.len(), 1);
        assert!(cache.get("user_session:1").await.unwrap().is_some());

        cache.clear("*").await.unwrap();
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_, cache) = setup(1024);
        cache.set("k", b"v", Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_initialize_falls_back_when_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut config = CacheConfig::default();
        config.l2.endpoint = format!("redis://{}", addr);
        config.l2.timeout_ms = 200;

        let cache = L2Cache::initialize(&config).await;
        assert!(cache.is_degraded());
        assert_eq!(cache.backend_name(), "in-memory");

        cache.set("k", b"v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().unwrap().as_ref(), b"v");
        assert!(cache.stats().await.unwrap().degraded);
    }
}
