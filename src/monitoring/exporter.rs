//! Prometheus exposition of cache state
//!
//! Gauges are refreshed from the latest snapshot rather than incremented, so
//! an administrative metrics reset is reflected on the next scrape.

use prometheus::{Encoder, Gauge, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use super::health::{HealthReport, HealthStatus};
use crate::cache::metrics::{CacheMetricsSnapshot, TierSnapshot};
use crate::cache::model::CacheTier;
use crate::error::{Error, Result};

const NAMESPACE: &str = "tiercache";

fn internal(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {}", e))
}

/// Owns a registry with every cache gauge
pub struct CacheExporter {
    registry: Registry,
    requests: IntGauge,
    hits: IntGauge,
    misses: IntGauge,
    writes: IntGauge,
    errors: IntGauge,
    hit_rate: Gauge,
    error_rate: Gauge,
    latency_ms: Gauge,
    tier_hits: IntGaugeVec,
    tier_misses: IntGaugeVec,
    tier_errors: IntGaugeVec,
    tier_latency_ms: GaugeVec,
    l1_items: IntGauge,
    l1_bytes: IntGauge,
    l1_limit_bytes: IntGauge,
    l1_evictions: IntGauge,
    health_status: IntGauge,
    performance_score: Gauge,
}

impl CacheExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let int_gauge = |name: &str, help: &str| -> Result<IntGauge> {
            let gauge = IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(internal)?;
            registry.register(Box::new(gauge.clone())).map_err(internal)?;
            Ok(gauge)
        };
        let gauge = |name: &str, help: &str| -> Result<Gauge> {
            let gauge = Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE)).map_err(internal)?;
            registry.register(Box::new(gauge.clone())).map_err(internal)?;
            Ok(gauge)
        };
        let tier_int_gauge = |name: &str, help: &str| -> Result<IntGaugeVec> {
            let vec = IntGaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), &["tier"]).map_err(internal)?;
            registry.register(Box::new(vec.clone())).map_err(internal)?;
            Ok(vec)
        };

        let tier_latency_ms = GaugeVec::new(
            Opts::new("tier_latency_ms", "Average lookup latency per tier").namespace(NAMESPACE),
            &["tier"],
        )
        .map_err(internal)?;
        registry.register(Box::new(tier_latency_ms.clone())).map_err(internal)?;

        Ok(Self {
            requests: int_gauge("requests", "Lookups since the last reset")?,
            hits: int_gauge("hits", "Lookups answered by any tier")?,
            misses: int_gauge("misses", "Lookups that missed every tier")?,
            writes: int_gauge("writes", "Write operations")?,
            errors: int_gauge("errors", "Tier failures, absorbed or propagated")?,
            hit_rate: gauge("hit_rate", "Fraction of lookups answered by any tier")?,
            error_rate: gauge("error_rate", "Errors per lookup")?,
            latency_ms: gauge("latency_ms", "Average end-to-end lookup latency")?,
            tier_hits: tier_int_gauge("tier_hits", "Hits per tier")?,
            tier_misses: tier_int_gauge("tier_misses", "Misses per tier")?,
            tier_errors: tier_int_gauge("tier_errors", "Errors per tier")?,
            tier_latency_ms,
            l1_items: int_gauge("l1_items", "Entries held in L1")?,
            l1_bytes: int_gauge("l1_bytes", "Bytes accounted in L1")?,
            l1_limit_bytes: int_gauge("l1_limit_bytes", "L1 byte budget")?,
            l1_evictions: int_gauge("l1_evictions", "L1 capacity evictions")?,
            health_status: int_gauge("health_status", "0 no data, 1 healthy, 2 warning, 3 critical")?,
            performance_score: gauge("performance_score", "Optimizer performance score (0-100)")?,
            registry,
        })
    }

    /// Refresh every counter gauge from a snapshot
    pub fn update(&self, snapshot: &CacheMetricsSnapshot) {
        self.requests.set(snapshot.total_requests as i64);
        self.hits.set(snapshot.total_hits as i64);
        self.misses.set(snapshot.total_misses as i64);
        self.writes.set(snapshot.write_operations as i64);
        self.errors.set(snapshot.errors as i64);
        self.hit_rate.set(snapshot.hit_rate);
        self.error_rate.set(snapshot.error_rate);
        self.latency_ms.set(snapshot.avg_latency_ms);

        for (tier, stats) in [
            (CacheTier::L1, &snapshot.l1),
            (CacheTier::L2, &snapshot.l2),
            (CacheTier::L3, &snapshot.l3),
        ] {
            self.update_tier(tier, stats);
        }

        self.l1_items.set(snapshot.l1_items as i64);
        self.l1_bytes.set(snapshot.l1_memory_bytes as i64);
        self.l1_limit_bytes.set(snapshot.l1_memory_limit_bytes as i64);
        self.l1_evictions.set(snapshot.l1_evictions as i64);
    }

    fn update_tier(&self, tier: CacheTier, stats: &TierSnapshot) {
        let label = [tier.label()];
        self.tier_hits.with_label_values(&label).set(stats.hits as i64);
        self.tier_misses.with_label_values(&label).set(stats.misses as i64);
        self.tier_errors.with_label_values(&label).set(stats.errors as i64);
        self.tier_latency_ms.with_label_values(&label).set(stats.avg_latency_ms);
    }

    pub fn update_health(&self, report: &HealthReport) {
        let code = match report.overall_status {
            HealthStatus::NoData => 0,
            HealthStatus::Healthy => 1,
            HealthStatus::Warning => 2,
            HealthStatus::Critical => 3,
        };
        self.health_status.set(code);
    }

    pub fn set_performance_score(&self, score: Option<f64>) {
        if let Some(score) = score {
            self.performance_score.set(score);
        }
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer).map_err(internal)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics are not UTF-8: {}", e)))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}
