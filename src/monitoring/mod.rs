//! Monitoring
//!
//! Performance analysis and alerting on top of the cache counters.
//!
//! ```text
//! CacheOrchestrator ──snapshot──► PerformanceOptimizer ──latest──► HealthMonitor
//!                                        │                               │
//!                                        └────────► CacheExporter ◄──────┘
//! ```

pub mod exporter;
pub mod health;
pub mod optimizer;
pub mod tasks;

pub use exporter::CacheExporter;
pub use health::{Alert, AlertLevel, AlertThresholds, HealthMonitor, HealthReport, HealthStatus};
pub use optimizer::{
    OptimizationRecommendation, OverallHealth, PerformanceMetrics, PerformanceOptimizer, PerformanceReport,
    Priority, TrendAnalysis, TrendReport,
};
pub use tasks::{spawn_expiry_sweeper, spawn_recorder, spawn_warmer};
