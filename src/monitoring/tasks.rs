//! Background tasks
//!
//! Each loop owns a `CancellationToken` and talks to the cache only through
//! the shared metrics and history state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::exporter::CacheExporter;
use super::health::{HealthMonitor, HealthStatus};
use super::optimizer::PerformanceOptimizer;
use crate::cache::config::WarmEntry;
use crate::cache::l1::L1Cache;
use crate::cache::orchestrator::CacheOrchestrator;
use crate::domain::ports::MetricsSource;

/// Periodically sample `source` into the optimizer, run the health check and
/// refresh the exporter. CRITICAL health is logged at error level.
pub fn spawn_recorder<S>(
    source: Arc<S>,
    optimizer: Arc<PerformanceOptimizer>,
    health: Arc<HealthMonitor>,
    exporter: Option<Arc<CacheExporter>>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()>
where
    S: MetricsSource + ?Sized + 'static,
{
    tokio::spawn(async move {
        info!(interval_ms = every.as_millis() as u64, "Starting metrics recorder");
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Metrics recorder shutting down");
                    break;
                }
                _ = tick.tick() => {
                    let sample = optimizer.record_metrics(source.as_ref());
                    let report = health.check_health();

                    if let Some(exporter) = &exporter {
                        exporter.update(&source.metrics_snapshot());
                        exporter.update_health(&report);
                        exporter.set_performance_score(optimizer.analyze_trends().performance_score());
                    }

                    match report.overall_status {
                        HealthStatus::Critical => {
                            for alert in &report.alerts {
                                error!(metric = %alert.metric, level = ?alert.level, "{}", alert.message);
                            }
                        }
                        status => debug!(?status, hit_rate = sample.hit_rate, "Health check"),
                    }
                }
            }
        }
    })
}

/// Periodically drop expired L1 entries so idle keys release their bytes
pub fn spawn_expiry_sweeper(l1: Arc<L1Cache>, every: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("L1 expiry sweeper shutting down");
                    break;
                }
                _ = tick.tick() => {
                    let purged = l1.purge_expired();
                    if purged > 0 {
                        debug!(purged, remaining = l1.len(), "Purged expired L1 entries");
                    }
                }
            }
        }
    })
}

/// Periodically re-populate `entries` into every eligible tier. The first
/// run happens immediately; entries whose payload cannot be built are
/// skipped.
pub fn spawn_warmer(
    cache: Arc<CacheOrchestrator>,
    entries: Vec<WarmEntry>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let prepared: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| match entry.payload() {
                Ok(payload) => Some((entry.key, payload, entry.content_type)),
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Skipping warm entry");
                    None
                }
            })
            .collect();
        info!(entries = prepared.len(), interval_ms = every.as_millis() as u64, "Starting cache warmer");

        let mut tick = interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Cache warmer shutting down");
                    break;
                }
                _ = tick.tick() => {
                    cache.warm(prepared.iter().cloned()).await;
                }
            }
        }
    })
}
