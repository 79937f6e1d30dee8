//! Error types for the tiered cache engine

use thiserror::Error;

use crate::cache::CacheTier;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Tier Errors
    // =========================================================================
    /// L1 refused to store an entry
    #[error("L1 rejected write for key {key}: {reason}")]
    L1Rejected { key: String, reason: String },

    /// Could not reach a network tier
    #[error("{tier} connection failed: {reason}")]
    Connection { tier: CacheTier, reason: String },

    /// Network tier call exceeded its deadline
    #[error("{tier} {operation} timed out after {timeout_ms}ms")]
    Timeout {
        tier: CacheTier,
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Key/value service command failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Edge HTTP request could not be sent
    #[error("Edge request failed: {0}")]
    EdgeRequest(#[source] reqwest::Error),

    /// Edge API returned an unexpected status
    #[error("Edge {operation} returned HTTP {status}")]
    EdgeStatus { operation: &'static str, status: u16 },

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config parse error
    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Key pattern is not a valid glob
    #[error("Invalid key pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// CSV export error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // =========================================================================
    // Monitoring Errors
    // =========================================================================
    /// Alert threshold name not recognized
    #[error("Unknown alert threshold: {0}")]
    UnknownThreshold(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for deadline expiries on a network tier
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
