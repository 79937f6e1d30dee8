//! TierCache - Multi-Tier Cache Engine
//!
//! A three-tier cache (in-process memory, shared key/value service, edge)
//! behind one Get/Set/Delete contract, with per-content-type consistency
//! policies, read-through backfill and self-tuning performance analysis.
//!
//! # Architecture
//!
//! ```text
//! caller ──► CacheOrchestrator ──► L1 (memory) ──► L2 (Redis) ──► L3 (edge)
//!                  │
//!                  └─ snapshot ─► PerformanceOptimizer ─► HealthMonitor ─► report
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Network clients and in-memory doubles implementing domain ports
//! - [`cache`] - Tiers, orchestrator, config, key derivation and metrics
//! - [`domain`] - Ports the tiers and monitoring depend on
//! - [`error`] - Error types
//! - [`monitoring`] - Optimizer, health monitor, Prometheus exporter, background tasks

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;
pub mod monitoring;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheOrchestrator, CachePolicy, CacheTier, ContentType, SetReport};
pub use error::{Error, Result};
pub use monitoring::{HealthMonitor, PerformanceOptimizer};
