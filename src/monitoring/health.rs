//! Health Monitor
//!
//! Compares the optimizer's latest sample against alert thresholds. A
//! threshold breach is an alert, never an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::optimizer::PerformanceOptimizer;
use crate::error::{Error, Result};

/// Runtime-adjustable alert thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    pub hit_rate_min: f64,
    pub latency_max_ms: f64,
    pub error_rate_max: f64,
    pub memory_usage_max_pct: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            hit_rate_min: 0.3,
            latency_max_ms: 200.0,
            error_rate_max: 0.1,
            memory_usage_max_pct: 90.0,
        }
    }
}

impl AlertThresholds {
    /// Threshold names accepted by `set`
    pub const NAMES: [&'static str; 4] = ["hit_rate_min", "latency_max_ms", "error_rate_max", "memory_usage_max_pct"];

    fn slot(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "hit_rate_min" => Some(&mut self.hit_rate_min),
            "latency_max_ms" => Some(&mut self.latency_max_ms),
            "error_rate_max" => Some(&mut self.error_rate_max),
            "memory_usage_max_pct" => Some(&mut self.memory_usage_max_pct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// Which side of the threshold is bad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// No samples recorded yet
    NoData,
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::NoData => write!(f, "NO_DATA"),
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Warning => write!(f, "WARNING"),
            HealthStatus::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub hit_rate: f64,
    pub latency_ms: f64,
    pub error_rate: f64,
    pub memory_usage_mb: f64,
    pub memory_usage_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub overall_status: HealthStatus,
    pub alerts: Vec<Alert>,
    pub metrics_summary: Option<MetricsSummary>,
}

impl HealthReport {
    pub fn is_critical(&self) -> bool {
        self.overall_status == HealthStatus::Critical
    }
}

fn check(metric: &str, value: f64, threshold: f64, bound: Bound, now: DateTime<Utc>) -> Option<Alert> {
    let breached = match bound {
        Bound::Min => value < threshold,
        Bound::Max => value > threshold,
    };
    if !breached {
        return None;
    }

    let level = if metric == "error_rate" {
        AlertLevel::Critical
    } else {
        AlertLevel::Warning
    };
    let direction = match bound {
        Bound::Min => "below",
        Bound::Max => "above",
    };

    Some(Alert {
        level,
        metric: metric.to_string(),
        message: format!("{} ({:.3}) {} threshold ({})", metric.replace('_', " "), value, direction, threshold),
        value,
        threshold,
        timestamp: now,
    })
}

/// Alerting layered on the optimizer history
pub struct HealthMonitor {
    optimizer: Arc<PerformanceOptimizer>,
    thresholds: RwLock<AlertThresholds>,
}

impl HealthMonitor {
    pub fn new(optimizer: Arc<PerformanceOptimizer>) -> Self {
        Self::with_thresholds(optimizer, AlertThresholds::default())
    }

    pub fn with_thresholds(optimizer: Arc<PerformanceOptimizer>, thresholds: AlertThresholds) -> Self {
        Self {
            optimizer,
            thresholds: RwLock::new(thresholds),
        }
    }

    pub fn thresholds(&self) -> AlertThresholds {
        *self.thresholds.read()
    }

    /// Change one threshold by name. Unknown names are logged and rejected.
    pub fn set_alert_threshold(&self, metric: &str, value: f64) -> Result<()> {
        let mut thresholds = self.thresholds.write();
        match thresholds.slot(metric) {
            Some(slot) => {
                *slot = value;
                info!(metric, value, "Alert threshold updated");
                Ok(())
            }
            None => {
                warn!(metric, "Unknown metric for alert threshold, ignored");
                Err(Error::UnknownThreshold(metric.to_string()))
            }
        }
    }

    /// Evaluate the latest sample. Error-rate breaches are CRITICAL, all
    /// other breaches WARNING.
    pub fn check_health(&self) -> HealthReport {
        let now = Utc::now();
        let Some(latest) = self.optimizer.latest() else {
            return HealthReport {
                checked_at: now,
                overall_status: HealthStatus::NoData,
                alerts: Vec::new(),
                metrics_summary: None,
            };
        };
        let t = self.thresholds();
        let memory_pct = latest.memory_utilization_pct();

        let alerts: Vec<Alert> = [
            check("hit_rate", latest.hit_rate, t.hit_rate_min, Bound::Min, now),
            check("latency", latest.average_latency_ms, t.latency_max_ms, Bound::Max, now),
            check("error_rate", latest.error_rate, t.error_rate_max, Bound::Max, now),
            check("memory_usage", memory_pct, t.memory_usage_max_pct, Bound::Max, now),
        ]
        .into_iter()
        .flatten()
        .collect();

        let overall_status = if alerts.iter().any(|a| a.level == AlertLevel::Critical) {
            HealthStatus::Critical
        } else if alerts.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        };

        HealthReport {
            checked_at: now,
            overall_status,
            alerts,
            metrics_summary: Some(MetricsSummary {
                hit_rate: latest.hit_rate,
                latency_ms: latest.average_latency_ms,
                error_rate: latest.error_rate,
                memory_usage_mb: latest.memory_usage_mb,
                memory_usage_pct: memory_pct,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::optimizer::PerformanceMetrics;
    use assert_matches::assert_matches;

    fn monitor_with(sample: PerformanceMetrics) -> HealthMonitor {
        let optimizer = Arc::new(PerformanceOptimizer::default());
        optimizer.record_sample(sample);
        HealthMonitor::new(optimizer)
    }

    #[test]
    fn test_no_data() {
        let monitor = HealthMonitor::new(Arc::new(PerformanceOptimizer::default()));
        let report = monitor.check_health();
        assert_eq!(report.overall_status, HealthStatus::NoData);
        assert!(report.metrics_summary.is_none());
    }

    #[test]
    fn test_healthy() {
        let monitor = monitor_with(PerformanceMetrics {
            hit_rate: 0.8,
            average_latency_ms: 5.0,
            ..Default::default()
        });
        let report = monitor.check_health();
        assert_eq!(report.overall_status, HealthStatus::Healthy);
        assert!(report.alerts.is_empty());
    }

    #[test]
    fn test_error_rate_is_critical() {
        let monitor = monitor_with(PerformanceMetrics {
            hit_rate: 0.1,
            error_rate: 0.5,
            ..Default::default()
        });
        let report = monitor.check_health();
        assert_eq!(report.overall_status, HealthStatus::Critical);
        assert!(report.is_critical());
        assert_eq!(report.alerts.len(), 2);
        let critical: Vec<_> = report.alerts.iter().filter(|a| a.level == AlertLevel::Critical).collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].metric, "error_rate");
    }

    #[test]
    fn test_memory_percentage() {
        let monitor = monitor_with(PerformanceMetrics {
            hit_rate: 0.9,
            memory_usage_mb: 95.0,
            memory_limit_mb: 100.0,
            ..Default::default()
        });
        let report = monitor.check_health();
        assert_eq!(report.overall_status, HealthStatus::Warning);
        assert_eq!(report.alerts[0].metric, "memory_usage");
        assert!(report.alerts[0].message.contains("above"));
    }

    #[test]
    fn test_set_alert_threshold() {
        let monitor = monitor_with(PerformanceMetrics {
            hit_rate: 0.5,
            ..Default::default()
        });
        assert_eq!(monitor.check_health().overall_status, HealthStatus::Healthy);

        monitor.set_alert_threshold("hit_rate_min", 0.6).unwrap();
        assert_eq!(monitor.thresholds().hit_rate_min, 0.6);
        assert_eq!(monitor.check_health().overall_status, HealthStatus::Warning);

        let before = monitor.thresholds();
        let err = monitor.set_alert_threshold("cpu_max", 1.0).unwrap_err();
        assert_matches!(err, Error::UnknownThreshold(ref name) if name == "cpu_max");
        assert_eq!(monitor.thresholds(), before);
    }

    #[test]
    fn test_threshold_names_are_settable() {
        let monitor = HealthMonitor::new(Arc::new(PerformanceOptimizer::default()));
        for name in AlertThresholds::NAMES {
            monitor.set_alert_threshold(name, 1.0).unwrap();
        }
        assert_eq!(monitor.thresholds().latency_max_ms, 1.0);
    }
}
