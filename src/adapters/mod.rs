//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports, following the
//! Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │             Ports (Traits): L2Client │ L3Client                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  RedisStore │ EdgeHttpClient │ InMemoryL2Client │ InMemoryL3Client│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tiercache::adapters::RedisStore;
//! use tiercache::domain::ports::L2Client;
//!
//! let client = RedisStore::connect(&config.l2).await?;
//! client.set_with_expiry("k", value, ttl).await?;
//! ```

pub mod edge;
pub mod memory;
pub mod redis_store;

pub use edge::EdgeHttpClient;
pub use memory::{pattern_matcher, InMemoryL2Client, InMemoryL3Client};
pub use redis_store::RedisStore;
