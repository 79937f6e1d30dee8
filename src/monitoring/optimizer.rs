//! Performance Optimizer
//!
//! Passive observer of a cache: samples its counters into a rolling window,
//! derives trends and a performance score, and emits tuning recommendations.
//! Never mutates cache state.
//!
//! History is written by one recorder and read by analysis. Readers copy the
//! window out and release the lock before computing anything.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::config::CacheConfig;
use crate::domain::ports::MetricsSource;
use crate::error::Result;

/// Default rolling window for samples
pub const DEFAULT_ANALYSIS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

const MIN_TREND_SAMPLES: usize = 2;
const MIN_RECOMMENDATION_SAMPLES: usize = 5;

// Rule thresholds
const LOW_HIT_RATE: f64 = 0.4;
const HIGH_LATENCY_MS: f64 = 100.0;
const HIGH_MEMORY_FRACTION: f64 = 0.8;
const HIGH_EVICTIONS_PER_HOUR: f64 = 100.0;
const HIGH_ERROR_RATE: f64 = 0.05;
const DECLINING_HIT_RATE_SLOPE: f64 = -0.1;

// Score normalization
const LATENCY_CEILING_MS: f64 = 200.0;

// =============================================================================
// Samples
// =============================================================================

/// Point-in-time performance sample. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub timestamp: DateTime<Utc>,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub average_latency_ms: f64,
    pub throughput_ops_per_sec: f64,
    pub memory_usage_mb: f64,
    /// L1 byte budget at sampling time
    pub memory_limit_mb: f64,
    pub cache_size: u64,
    pub evictions_per_hour: f64,
    pub error_rate: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            hit_rate: 0.0,
            miss_rate: 1.0,
            average_latency_ms: 0.0,
            throughput_ops_per_sec: 0.0,
            memory_usage_mb: 0.0,
            memory_limit_mb: 0.0,
            cache_size: 0,
            evictions_per_hour: 0.0,
            error_rate: 0.0,
        }
    }
}

impl PerformanceMetrics {
    /// L1 memory in use as a percentage of its budget
    pub fn memory_utilization_pct(&self) -> f64 {
        if self.memory_limit_mb <= 0.0 {
            0.0
        } else {
            self.memory_usage_mb / self.memory_limit_mb * 100.0
        }
    }
}

// =============================================================================
// Trend Analysis
// =============================================================================

/// Descriptive statistics for one tracked metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesStats {
    pub current: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    /// Least-squares slope per sample
    pub trend: f64,
}

impl SeriesStats {
    fn from_values(values: &[f64]) -> Self {
        Self {
            current: values.last().copied().unwrap_or(0.0),
            average: mean(values),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: std_dev(values),
            trend: slope(values),
        }
    }
}

/// Trends and statistics over the current window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub analysis_timestamp: DateTime<Utc>,
    pub metrics_count: usize,
    pub time_window_hours: f64,
    pub hit_rate: SeriesStats,
    pub latency: SeriesStats,
    pub latency_p95: f64,
    pub throughput: SeriesStats,
    pub memory_usage: SeriesStats,
    /// Overall score in [0, 100]
    pub performance_score: f64,
}

impl TrendReport {
    fn from_samples(samples: &[PerformanceMetrics], window: Duration) -> Self {
        let series = |f: fn(&PerformanceMetrics) -> f64| samples.iter().map(f).collect::<Vec<_>>();

        let hit_rates = series(|m| m.hit_rate);
        let latencies = series(|m| m.average_latency_ms);
        let throughputs = series(|m| m.throughput_ops_per_sec);
        let memory = series(|m| m.memory_usage_mb);

        let hit_rate = SeriesStats::from_values(&hit_rates);
        let latency = SeriesStats::from_values(&latencies);
        let throughput = SeriesStats::from_values(&throughputs);

        Self {
            analysis_timestamp: Utc::now(),
            metrics_count: samples.len(),
            time_window_hours: window.as_secs_f64() / 3600.0,
            latency_p95: percentile(&latencies, 95.0),
            performance_score: performance_score(hit_rate.current, latency.current, throughput.current, throughput.average),
            memory_usage: SeriesStats::from_values(&memory),
            hit_rate,
            latency,
            throughput,
        }
    }
}

/// Result of `analyze_trends`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendAnalysis {
    /// Fewer than two samples in the window
    InsufficientData { samples: usize },
    Ready(TrendReport),
}

impl TrendAnalysis {
    pub fn report(&self) -> Option<&TrendReport> {
        match self {
            TrendAnalysis::Ready(report) => Some(report),
            TrendAnalysis::InsufficientData { .. } => None,
        }
    }

    pub fn performance_score(&self) -> Option<f64> {
        self.report().map(|r| r.performance_score)
    }
}

/// Weighted score: hit rate 40%, latency 30% (200ms scores zero), and
/// current throughput relative to the window average 30%
pub fn performance_score(hit_rate: f64, latency_ms: f64, throughput: f64, avg_throughput: f64) -> f64 {
    let hit_rate_score = hit_rate * 100.0;
    let latency_score = (100.0 - latency_ms / LATENCY_CEILING_MS * 100.0).max(0.0);
    let throughput_score = (throughput / avg_throughput.max(1.0) * 100.0).min(100.0);

    let score = hit_rate_score * 0.4 + latency_score * 0.3 + throughput_score * 0.3;
    (score * 10.0).round() / 10.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Linear-regression slope of `values` over their index
fn slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);

    let (num, den) = values.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });

    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Percentile with linear interpolation between closest ranks
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64)
}

// =============================================================================
// Recommendations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Effort {
    Low,
    Medium,
    High,
}

/// A tuning suggestion. Produced fresh on each analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecommendation {
    pub category: String,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub current_value: String,
    pub recommended_value: String,
    pub expected_improvement: String,
    pub implementation_effort: Effort,
}

impl OptimizationRecommendation {
    #[allow(clippy::too_many_arguments)]
    fn new(
        category: &str,
        priority: Priority,
        title: &str,
        description: &str,
        current_value: String,
        recommended_value: String,
        expected_improvement: &str,
        implementation_effort: Effort,
    ) -> Self {
        Self {
            category: category.to_string(),
            priority,
            title: title.to_string(),
            description: description.to_string(),
            current_value,
            recommended_value,
            expected_improvement: expected_improvement.to_string(),
            implementation_effort,
        }
    }
}

fn hit_rate_rule(latest: &PerformanceMetrics, config: &CacheConfig) -> Option<OptimizationRecommendation> {
    (latest.hit_rate < LOW_HIT_RATE).then(|| {
        OptimizationRecommendation::new(
            "Cache Size",
            Priority::High,
            "Increase L1 Cache Size",
            "Hit rate is below 40%. Increasing L1 cache size will improve performance.",
            format!("{}MB", config.l1.max_size_mb),
            format!("{}MB", config.l1.max_size_mb * 2),
            "20-30% hit rate increase",
            Effort::Low,
        )
    })
}

fn latency_rule(latest: &PerformanceMetrics, config: &CacheConfig) -> Option<OptimizationRecommendation> {
    (latest.average_latency_ms > HIGH_LATENCY_MS).then(|| {
        OptimizationRecommendation::new(
            "Latency",
            Priority::High,
            "Enable Compression",
            "High latency detected. Enable compression to reduce network overhead.",
            config.compression_enabled.to_string(),
            "true".to_string(),
            "30-50% latency reduction",
            Effort::Low,
        )
    })
}

fn memory_rule(latest: &PerformanceMetrics, config: &CacheConfig) -> Option<OptimizationRecommendation> {
    let limit_mb = config.l1.max_size_mb as f64;
    (latest.memory_usage_mb > limit_mb * HIGH_MEMORY_FRACTION).then(|| {
        OptimizationRecommendation::new(
            "Memory Management",
            Priority::Medium,
            "Optimize TTL Settings",
            "Memory usage is high. Reducing TTL for less important content can help.",
            format!("{:.1}MB of {}MB", latest.memory_usage_mb, config.l1.max_size_mb),
            "Reduced TTL for transcriptions and emotion analysis".to_string(),
            "20-25% memory reduction",
            Effort::Medium,
        )
    })
}

fn eviction_rule(latest: &PerformanceMetrics) -> Option<OptimizationRecommendation> {
    (latest.evictions_per_hour > HIGH_EVICTIONS_PER_HOUR).then(|| {
        OptimizationRecommendation::new(
            "Cache Efficiency",
            Priority::Medium,
            "Implement Smart Eviction",
            "High eviction rate detected. Implement LFU or custom eviction policy.",
            "LRU eviction".to_string(),
            "LFU or weighted eviction".to_string(),
            "15-20% efficiency increase",
            Effort::High,
        )
    })
}

fn error_rate_rule(latest: &PerformanceMetrics) -> Option<OptimizationRecommendation> {
    (latest.error_rate > HIGH_ERROR_RATE).then(|| {
        OptimizationRecommendation::new(
            "Reliability",
            Priority::High,
            "Improve Error Handling",
            "Error rate is above 5%. Implement better fallback mechanisms.",
            format!("{:.2}%", latest.error_rate * 100.0),
            "<2%".to_string(),
            "Better reliability and user experience",
            Effort::Medium,
        )
    })
}

fn hit_rate_trend_rule(report: &TrendReport) -> Option<OptimizationRecommendation> {
    let trend = report.hit_rate.trend;
    (trend < DECLINING_HIT_RATE_SLOPE).then(|| {
        OptimizationRecommendation::new(
            "Performance Degradation",
            Priority::High,
            "Investigate Hit Rate Decline",
            "Hit rate is declining over time. Review cache key generation and TTL settings.",
            format!("Trending down {:.1}% per sample", trend.abs() * 100.0),
            "Stable or increasing".to_string(),
            "Prevent further performance degradation",
            Effort::Medium,
        )
    })
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallHealth {
    Good,
    Fair,
    Poor,
    /// Not enough samples to score
    Unknown,
}

impl OverallHealth {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => OverallHealth::Unknown,
            Some(s) if s < 50.0 => OverallHealth::Poor,
            Some(s) if s < 75.0 => OverallHealth::Fair,
            Some(_) => OverallHealth::Good,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub overall_health: OverallHealth,
    /// HIGH priority recommendations
    pub critical_issues: usize,
    pub optimization_opportunities: usize,
    pub performance_score: Option<f64>,
}

/// Operator-facing performance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub report_timestamp: DateTime<Utc>,
    pub summary: ReportSummary,
    pub current_metrics: PerformanceMetrics,
    pub trends_analysis: TrendAnalysis,
    pub recommendations: Vec<OptimizationRecommendation>,
    pub next_analysis_suggested: DateTime<Utc>,
}

// =============================================================================
// Optimizer
// =============================================================================

#[derive(Default)]
struct History {
    samples: VecDeque<PerformanceMetrics>,
    /// Cumulative eviction count at the previous recording
    last_evictions: Option<(DateTime<Utc>, u64)>,
}

/// Samples cache counters and turns them into trends and recommendations
pub struct PerformanceOptimizer {
    window: Duration,
    history: RwLock<History>,
}

impl Default for PerformanceOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYSIS_WINDOW)
    }
}

impl PerformanceOptimizer {
    /// Create an optimizer keeping samples for `window`
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            history: RwLock::new(History::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Pull a snapshot from `source`, derive a sample and append it
    pub fn record_metrics<S: MetricsSource + ?Sized>(&self, source: &S) -> PerformanceMetrics {
        let snapshot = source.metrics_snapshot();
        let now = Utc::now();

        let mut history = self.history.write();

        let span = history.samples.len().max(1) as f64;
        let evictions_per_hour = match history.last_evictions {
            Some((at, previous)) => {
                let hours = (now - at).num_milliseconds().max(1) as f64 / 3_600_000.0;
                snapshot.l1_evictions.saturating_sub(previous) as f64 / hours
            }
            None => snapshot.l1_evictions as f64,
        };
        history.last_evictions = Some((now, snapshot.l1_evictions));

        let sample = PerformanceMetrics {
            timestamp: now,
            hit_rate: snapshot.hit_rate,
            miss_rate: 1.0 - snapshot.hit_rate,
            average_latency_ms: snapshot.avg_latency_ms,
            throughput_ops_per_sec: snapshot.total_requests as f64 / span,
            memory_usage_mb: snapshot.memory_usage_mb(),
            memory_limit_mb: snapshot.memory_limit_mb(),
            cache_size: snapshot.l1_items,
            evictions_per_hour,
            error_rate: snapshot.error_rate,
        };

        self.push(&mut history, sample.clone());
        debug!(
            hit_rate = sample.hit_rate,
            latency_ms = sample.average_latency_ms,
            samples = history.samples.len(),
            "Recorded performance sample"
        );
        sample
    }

    /// Append an externally built sample
    pub fn record_sample(&self, sample: PerformanceMetrics) {
        let mut history = self.history.write();
        self.push(&mut history, sample);
    }

    fn push(&self, history: &mut History, sample: PerformanceMetrics) {
        history.samples.push_back(sample);

        let cutoff = chrono::Duration::from_std(self.window)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window));
        if let Some(cutoff) = cutoff {
            while history.samples.front().map(|s| s.timestamp <= cutoff).unwrap_or(false) {
                history.samples.pop_front();
            }
        }
    }

    /// Write the window as CSV, header first, one row per sample. Returns
    /// false without touching `path` when there is nothing to export.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<bool> {
        let samples = self.history();
        if samples.is_empty() {
            return Ok(false);
        }

        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path)?;
        for sample in &samples {
            writer.serialize(sample)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = samples.len(), "Metrics exported");
        Ok(true)
    }

    /// Copy of the samples in the window, oldest first
    pub fn history(&self) -> Vec<PerformanceMetrics> {
        self.history.read().samples.iter().cloned().collect()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<PerformanceMetrics> {
        self.history.read().samples.back().cloned()
    }

    pub fn sample_count(&self) -> usize {
        self.history.read().samples.len()
    }

    /// Trends over the window; needs at least two samples
    pub fn analyze_trends(&self) -> TrendAnalysis {
        let samples = self.history();
        if samples.len() < MIN_TREND_SAMPLES {
            return TrendAnalysis::InsufficientData { samples: samples.len() };
        }
        TrendAnalysis::Ready(TrendReport::from_samples(&samples, self.window))
    }

    /// Rule-based recommendations, HIGH first; empty below five samples
    pub fn generate_recommendations(&self, config: &CacheConfig) -> Vec<OptimizationRecommendation> {
        let samples = self.history();
        let Some(latest) = samples.last() else {
            return Vec::new();
        };
        if samples.len() < MIN_RECOMMENDATION_SAMPLES {
            return Vec::new();
        }

        let report = TrendReport::from_samples(&samples, self.window);
        let mut recommendations: Vec<_> = [
            hit_rate_rule(latest, config),
            latency_rule(latest, config),
            memory_rule(latest, config),
            eviction_rule(latest),
            error_rate_rule(latest),
            hit_rate_trend_rule(&report),
        ]
        .into_iter()
        .flatten()
        .collect();

        recommendations.sort_by_key(|r| r.priority);
        recommendations
    }

    /// Record a fresh sample, then build the full operator report
    pub fn generate_report<S: MetricsSource + ?Sized>(&self, source: &S, config: &CacheConfig) -> PerformanceReport {
        let current_metrics = self.record_metrics(source);
        let trends_analysis = self.analyze_trends();
        let recommendations = self.generate_recommendations(config);

        let performance_score = trends_analysis.performance_score();
        let summary = ReportSummary {
            overall_health: OverallHealth::from_score(performance_score),
            critical_issues: recommendations.iter().filter(|r| r.priority == Priority::High).count(),
            optimization_opportunities: recommendations.len(),
            performance_score,
        };
        info!(
            health = ?summary.overall_health,
            score = ?summary.performance_score,
            recommendations = summary.optimization_opportunities,
            "Performance report generated"
        );

        let now = Utc::now();
        PerformanceReport {
            report_timestamp: now,
            summary,
            current_metrics,
            trends_analysis,
            recommendations,
            next_analysis_suggested: now + chrono::Duration::hours(1),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metrics::CacheMetricsSnapshot;
    use parking_lot::Mutex;

    fn sample(hit_rate: f64, latency_ms: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            hit_rate,
            miss_rate: 1.0 - hit_rate,
            average_latency_ms: latency_ms,
            throughput_ops_per_sec: 10.0,
            ..Default::default()
        }
    }

    struct FixedSource(Mutex<CacheMetricsSnapshot>);

    impl MetricsSource for FixedSource {
        fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
            self.0.lock().clone()
        }
    }

    #[test]
    fn test_statistics_helpers() {
        assert_eq!(slope(&[1.0]), 0.0);
        assert!((slope(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
        assert!((slope(&[0.9, 0.8, 0.7, 0.5, 0.3]) + 0.15).abs() < 1e-12);

        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138089935).abs() < 1e-6);
        assert_eq!(std_dev(&[3.0]), 0.0);

        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0, 50.0], 50.0), 30.0);
        assert!((percentile(&[10.0, 20.0, 30.0, 40.0, 50.0], 95.0) - 48.0).abs() < 1e-9);
        assert_eq!(percentile(&[], 95.0), 0.0);
    }

    #[test]
    fn test_performance_score() {
        // Perfect hit rate, zero latency, steady throughput
        assert_eq!(performance_score(1.0, 0.0, 10.0, 10.0), 100.0);
        // Latency at the ceiling scores zero for that component
        assert_eq!(performance_score(0.5, 200.0, 10.0, 10.0), 50.0);
        assert_eq!(performance_score(0.0, 400.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_insufficient_data() {
        let optimizer = PerformanceOptimizer::default();
        assert_eq!(optimizer.analyze_trends(), TrendAnalysis::InsufficientData { samples: 0 });

        optimizer.record_sample(sample(0.1, 500.0));
        assert_eq!(optimizer.analyze_trends(), TrendAnalysis::InsufficientData { samples: 1 });

        for _ in 0..3 {
            optimizer.record_sample(sample(0.1, 500.0));
        }
        assert!(optimizer.analyze_trends().report().is_some());
        assert!(optimizer.generate_recommendations(&CacheConfig::default()).is_empty());
    }

    #[test]
    fn test_trend_report() {
        let optimizer = PerformanceOptimizer::default();
        for (hit, lat) in [(0.5, 10.0), (0.6, 20.0), (0.7, 30.0)] {
            optimizer.record_sample(sample(hit, lat));
        }

        let analysis = optimizer.analyze_trends();
        let report = analysis.report().unwrap();
        assert_eq!(report.metrics_count, 3);
        assert_eq!(report.time_window_hours, 24.0);
        assert!((report.hit_rate.trend - 0.1).abs() < 1e-9);
        assert!((report.latency.average - 20.0).abs() < 1e-9);
        assert_eq!(report.latency.max, 30.0);
        assert!((report.latency_p95 - 29.0).abs() < 1e-9);
        // 0.7*40 + (100-15)*0.3 + 100*0.3
        assert!((report.performance_score - 83.5).abs() < 1e-9);
    }

    #[test]
    fn test_recommendations_sorted_by_priority() {
        let optimizer = PerformanceOptimizer::default();
        for _ in 0..5 {
            optimizer.record_sample(PerformanceMetrics {
                hit_rate: 0.9,
                evictions_per_hour: 500.0,
                error_rate: 0.2,
                ..Default::default()
            });
        }

        let recs = optimizer.generate_recommendations(&CacheConfig::default());
        let titles: Vec<_> = recs.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Improve Error Handling", "Implement Smart Eviction"]);
        assert_eq!(recs[0].current_value, "20.00%");
    }

    #[test]
    fn test_high_latency_recommends_compression() {
        let optimizer = PerformanceOptimizer::default();
        for _ in 0..5 {
            optimizer.record_sample(sample(0.9, 150.0));
        }

        // Default config already compresses; the rule still fires
        let recs = optimizer.generate_recommendations(&CacheConfig::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].title, "Enable Compression");
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].current_value, "true");

        let mut config = CacheConfig::default();
        config.compression_enabled = false;
        let recs = optimizer.generate_recommendations(&config);
        assert_eq!(recs[0].title, "Enable Compression");
        assert_eq!(recs[0].current_value, "false");
        assert_eq!(recs[0].recommended_value, "true");
    }

    #[test]
    fn test_latency_at_threshold_is_quiet() {
        let optimizer = PerformanceOptimizer::default();
        for _ in 0..5 {
            optimizer.record_sample(sample(0.9, 100.0));
        }
        assert!(optimizer.generate_recommendations(&CacheConfig::default()).is_empty());
    }

    fn export_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tiercache-{}-{}.csv", name, std::process::id()))
    }

    #[test]
    fn test_export_csv_empty_history() {
        let optimizer = PerformanceOptimizer::default();
        let path = export_path("empty");
        assert!(!optimizer.export_csv(&path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_export_csv_reads_back() {
        let optimizer = PerformanceOptimizer::default();
        optimizer.record_sample(sample(0.5, 12.5));
        optimizer.record_sample(PerformanceMetrics {
            cache_size: 42,
            error_rate: 0.25,
            ..sample(0.75, 30.0)
        });

        let path = export_path("history");
        assert!(optimizer.export_csv(&path).unwrap());

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "timestamp");
        assert_eq!(&headers[1], "hit_rate");
        assert_eq!(headers.len(), 10);

        let rows: Vec<PerformanceMetrics> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows, optimizer.history());
        assert_eq!(rows[1].cache_size, 42);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_memory_rule() {
        let optimizer = PerformanceOptimizer::default();
        let config = CacheConfig::default();
        let limit = config.l1.max_size_mb as f64;
        for _ in 0..5 {
            optimizer.record_sample(PerformanceMetrics {
                hit_rate: 0.9,
                memory_usage_mb: limit * 0.85,
                ..Default::default()
            });
        }

        let recs = optimizer.generate_recommendations(&config);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].priority, Priority::Medium);
        assert_eq!(recs[0].category, "Memory Management");
    }

    #[test]
    fn test_window_trims_old_samples() {
        let optimizer = PerformanceOptimizer::new(Duration::from_secs(3600));
        optimizer.record_sample(PerformanceMetrics {
            timestamp: Utc::now() - chrono::Duration::hours(2),
            ..Default::default()
        });
        optimizer.record_sample(sample(0.5, 1.0));

        assert_eq!(optimizer.sample_count(), 1);
        assert_eq!(optimizer.latest().unwrap().hit_rate, 0.5);
    }

    #[test]
    fn test_record_metrics_from_source() {
        let source = FixedSource(Mutex::new(CacheMetricsSnapshot {
            total_requests: 100,
            hit_rate: 0.75,
            avg_latency_ms: 2.5,
            error_rate: 0.01,
            l1_items: 42,
            l1_memory_bytes: 3 * 1024 * 1024,
            l1_memory_limit_bytes: 12 * 1024 * 1024,
            l1_evictions: 7,
            ..Default::default()
        }));
        let optimizer = PerformanceOptimizer::default();

        let first = optimizer.record_metrics(&source);
        assert_eq!(first.hit_rate, 0.75);
        assert!((first.miss_rate - 0.25).abs() < 1e-9);
        assert_eq!(first.throughput_ops_per_sec, 100.0);
        assert_eq!(first.cache_size, 42);
        assert_eq!(first.evictions_per_hour, 7.0);
        assert!((first.memory_utilization_pct() - 25.0).abs() < 1e-9);

        // Second sample: throughput divides by the number of prior samples,
        // evictions become a rate over the elapsed time
        let second = optimizer.record_metrics(&source);
        assert_eq!(second.throughput_ops_per_sec, 100.0);
        assert_eq!(second.evictions_per_hour, 0.0);

        source.0.lock().total_requests = 300;
        let third = optimizer.record_metrics(&source);
        assert_eq!(third.throughput_ops_per_sec, 150.0);
    }

    #[test]
    fn test_generate_report() {
        let source = FixedSource(Mutex::new(CacheMetricsSnapshot {
            total_requests: 10,
            hit_rate: 0.95,
            avg_latency_ms: 1.0,
            ..Default::default()
        }));
        let optimizer = PerformanceOptimizer::default();

        let report = optimizer.generate_report(&source, &CacheConfig::default());
        assert_eq!(report.summary.overall_health, OverallHealth::Unknown);
        assert!(report.recommendations.is_empty());

        let report = optimizer.generate_report(&source, &CacheConfig::default());
        assert_eq!(report.summary.overall_health, OverallHealth::Good);
        assert!(report.next_analysis_suggested > report.report_timestamp);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["trends_analysis"]["status"], "ready");
        assert_eq!(json["summary"]["overall_health"], "GOOD");
    }

    #[test]
    fn test_overall_health_bands() {
        assert_eq!(OverallHealth::from_score(Some(49.9)), OverallHealth::Poor);
        assert_eq!(OverallHealth::from_score(Some(50.0)), OverallHealth::Fair);
        assert_eq!(OverallHealth::from_score(Some(75.0)), OverallHealth::Good);
        assert_eq!(OverallHealth::from_score(None), OverallHealth::Unknown);
    }
}
