//! Domain Layer
//!
//! Port traits that decouple the cache tiers from their network backends.
//!
//! # Usage
//!
//! ```ignore
//! use tiercache::domain::ports::L2Client;
//!
//! async fn warm<C: L2Client>(client: &C) -> Result<()> {
//!     client.ping().await?;
//!     // ...
//! }
//! ```

pub mod ports;

pub use ports::{L2Client, L2ServerStats, L3Client, MetricsSource};
