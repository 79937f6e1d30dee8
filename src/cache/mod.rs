//! Three-Tier Cache Engine
//!
//! Memory (L1), shared key/value service (L2) and edge (L3) tiers composed
//! by a single orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                          Cache Orchestrator                               │
//! │        policy per content type │ read-through backfill │ metrics          │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  L1 Cache (Memory)     │ L2 Cache (Key/Value)    │ L3 Cache (Edge)        │
//! │  ┌──────────────────┐  │ ┌────────────────────┐  │ ┌──────────────────┐   │
//! │  │ LRU map          │  │ │ redis / cluster    │  │ │ HTTP object API  │   │
//! │  │ items + bytes cap│  │ │ COMPRESSED: framing│  │ │ static + artifact│   │
//! │  └──────────────────┘  │ └────────────────────┘  │ └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Values are opaque bytes tagged with a [`ContentType`], which selects the
//! per-tier TTLs, the [`CachePolicy`] and edge eligibility.

pub mod compression;
pub mod config;
pub mod key;
pub mod l1;
pub mod l2;
pub mod l3;
pub mod metrics;
pub mod model;
pub mod orchestrator;

#[cfg(test)]
mod proptest;

pub use compression::{CompressionAlgorithm, CompressionManager, Compressor, COMPRESSED_MARKER};
pub use config::{CacheConfig, L1Config, L2Config, L3Config, WarmEntry};
pub use key::derive_key;
pub use l1::{L1Cache, L1Stats};
pub use l2::{L2Cache, L2Stats};
pub use l3::L3Cache;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot, TierSnapshot};
pub use model::{CacheEntry, CachePolicy, CacheTier, ContentProfile, ContentType};
pub use orchestrator::{CacheOrchestrator, SetReport, TierHealth};
