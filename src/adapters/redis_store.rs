//! Redis Adapter
//!
//! Implements the `L2Client` port against a Redis-compatible key/value
//! service through the `redis` crate.
//!
//! # Features
//!
//! - Standalone: one auto-reconnecting `ConnectionManager`
//! - Cluster: `cluster_async` routes keyed commands by hash slot; scan,
//!   flush and `INFO` fan out to every configured node
//! - At most `max_connections` commands in flight
//! - Optional password applied on top of the endpoint URL

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::try_join_all;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::{AsyncCommands, AsyncIter, Client, ConnectionInfo, InfoDict, IntoConnectionInfo};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{info, instrument};

use crate::cache::config::L2Config;
use crate::cache::CacheTier;
use crate::domain::ports::{L2Client, L2ServerStats};
use crate::error::{Error, Result};

const BACKOFF_BASE: u64 = 2;
const BACKOFF_FACTOR_MS: u64 = 100;
const CONNECT_RETRIES: usize = 2;

/// Connection used for single-key commands
#[derive(Clone)]
enum KeyedConnection {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

/// Run `$body` with `$conn` bound to a fresh handle of either connection kind
macro_rules! with_keyed {
    ($store:expr, |$conn:ident| $body:expr) => {
        match $store.keyed.clone() {
            KeyedConnection::Standalone(mut $conn) => $body,
            KeyedConnection::Cluster(mut $conn) => $body,
        }
    };
}

/// Build connection info for one endpoint. Bare `host:port` is accepted and
/// a configured password overrides one embedded in the URL.
pub fn connection_info(endpoint: &str, password: Option<&str>) -> Result<ConnectionInfo> {
    let url = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("redis://{}", endpoint)
    };
    let mut info = url
        .as_str()
        .into_connection_info()
        .map_err(|e| Error::Config(format!("invalid L2 endpoint {:?}: {}", endpoint, e)))?;
    if let Some(password) = password {
        info.redis.password = Some(password.to_string());
    }
    Ok(info)
}

fn connect_error(endpoint: &str, e: redis::RedisError) -> Error {
    Error::Connection {
        tier: CacheTier::L2,
        reason: format!("{}: {}", endpoint, e),
    }
}

/// Pull the counters we track out of an `INFO` reply
pub fn stats_from_info(info: &InfoDict) -> L2ServerStats {
    let counter = |name: &str| info.get::<u64>(name).unwrap_or(0);
    L2ServerStats {
        connected_clients: counter("connected_clients"),
        used_memory_bytes: counter("used_memory"),
        keyspace_hits: counter("keyspace_hits"),
        keyspace_misses: counter("keyspace_misses"),
        expired_keys: counter("expired_keys"),
        evicted_keys: counter("evicted_keys"),
        nodes: 1,
    }
}

/// Expiry as `EX` seconds when whole, `PX` milliseconds otherwise; never zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Seconds(u64),
    Millis(u64),
}

impl From<Duration> for Expiry {
    fn from(ttl: Duration) -> Self {
        if ttl.subsec_millis() == 0 && ttl.as_secs() > 0 {
            Expiry::Seconds(ttl.as_secs())
        } else {
            Expiry::Millis((ttl.as_millis().min(u64::MAX as u128) as u64).max(1))
        }
    }
}

/// Redis-backed L2 client
pub struct RedisStore {
    keyed: KeyedConnection,
    /// One connection per configured node for fan-out commands
    nodes: Vec<ConnectionManager>,
    permits: Semaphore,
}

impl RedisStore {
    /// Connect to the configured endpoint or cluster nodes
    pub async fn connect(config: &L2Config) -> Result<Self> {
        let endpoints = config.nodes();
        if endpoints.is_empty() {
            return Err(Error::Config("no L2 endpoints configured".into()));
        }
        let infos = endpoints
            .iter()
            .map(|endpoint| connection_info(endpoint, config.password.as_deref()))
            .collect::<Result<Vec<_>>>()?;

        let mut nodes = Vec::with_capacity(infos.len());
        for (endpoint, info) in endpoints.iter().zip(infos.iter().cloned()) {
            let client = Client::open(info).map_err(|e| connect_error(endpoint, e))?;
            let manager = client
                .get_connection_manager_with_backoff(BACKOFF_BASE, BACKOFF_FACTOR_MS, CONNECT_RETRIES)
                .await
                .map_err(|e| connect_error(endpoint, e))?;
            nodes.push(manager);
        }

        let keyed = if config.cluster_mode {
            let client = ClusterClient::new(infos).map_err(|e| connect_error("cluster", e))?;
            let connection = client
                .get_async_connection()
                .await
                .map_err(|e| connect_error("cluster", e))?;
            KeyedConnection::Cluster(connection)
        } else {
            KeyedConnection::Standalone(nodes[0].clone())
        };

        let store = Self {
            keyed,
            nodes,
            permits: Semaphore::new(config.max_connections.max(1)),
        };
        store.ping().await?;

        info!(
            nodes = store.nodes.len(),
            cluster_mode = config.cluster_mode,
            max_in_flight = config.max_connections,
            "Connected to L2 key/value service"
        );
        Ok(store)
    }

    async fn permit(&self) -> Result<SemaphorePermit<'_>> {
        self.permits
            .acquire()
            .await
            .map_err(|_| Error::Internal("L2 command permits closed".into()))
    }

    fn is_cluster(&self) -> bool {
        matches!(self.keyed, KeyedConnection::Cluster(_))
    }

    async fn scan_node(mut conn: ConnectionManager, pattern: &str) -> Result<Vec<String>> {
        let iter: AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        Ok(iter.collect().await)
    }
}

#[async_trait]
impl L2Client for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let _permit = self.permit().await?;
        try_join_all(self.nodes.iter().cloned().map(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, Error>(())
        }))
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let _permit = self.permit().await?;
        let value: Option<Vec<u8>> = with_keyed!(self, |conn| conn.get(key).await?);
        Ok(value.map(Bytes::from))
    }

    #[instrument(skip(self, value), fields(size = value.len()))]
    async fn set_with_expiry(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let _permit = self.permit().await?;
        let payload: &[u8] = value.as_ref();
        match Expiry::from(ttl) {
            Expiry::Seconds(seconds) => {
                with_keyed!(self, |conn| conn.set_ex::<_, _, ()>(key, payload, seconds).await?)
            }
            Expiry::Millis(millis) => {
                with_keyed!(self, |conn| conn.pset_ex::<_, _, ()>(key, payload, millis).await?)
            }
        }
        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let _permit = self.permit().await?;

        // Keys of one batch may live in different slots
        if self.is_cluster() {
            let counts = try_join_all(keys.iter().map(|key| async move {
                let removed: u64 = with_keyed!(self, |conn| conn.del(key).await?);
                Ok::<_, Error>(removed)
            }))
            .await?;
            return Ok(counts.into_iter().sum());
        }

        let removed: u64 = with_keyed!(self, |conn| conn.del(keys).await?);
        Ok(removed)
    }

    #[instrument(skip(self))]
    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let _permit = self.permit().await?;
        let per_node = try_join_all(
            self.nodes
                .iter()
                .cloned()
                .map(|conn| Self::scan_node(conn, pattern)),
        )
        .await?;
        Ok(per_node.into_iter().flatten().collect())
    }

    #[instrument(skip(self))]
    async fn flush(&self) -> Result<()> {
        let _permit = self.permit().await?;
        try_join_all(self.nodes.iter().cloned().map(|mut conn| async move {
            let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
            Ok::<_, Error>(())
        }))
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn server_stats(&self) -> Result<L2ServerStats> {
        let _permit = self.permit().await?;
        let per_node = try_join_all(self.nodes.iter().cloned().map(|mut conn| async move {
            let info: InfoDict = redis::cmd("INFO").query_async(&mut conn).await?;
            Ok::<_, Error>(stats_from_info(&info))
        }))
        .await?;

        Ok(per_node.iter().fold(L2ServerStats::default(), |mut total, node| {
            total.merge(node);
            total
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
