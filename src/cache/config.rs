//! Cache Configuration
//!
//! Serde-backed config loaded from YAML, overlaid with `CACHE_*` environment
//! variables, then validated before any tier is constructed.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::model::{CachePolicy, CacheTier, ContentProfile, ContentType};
use crate::error::{Error, Result};

const MIB: u64 = 1024 * 1024;

// =============================================================================
// Per-tier Configuration
// =============================================================================

/// L1 (memory) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L1Config {
    pub enabled: bool,
    /// Byte budget in MiB
    pub max_size_mb: u64,
    /// Item budget
    pub max_items: usize,
    /// Default TTL when a caller passes zero
    pub ttl_seconds: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: 100,
            max_items: 10_000,
            ttl_seconds: 300,
        }
    }
}

impl L1Config {
    /// Byte budget
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(MIB)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// L2 (distributed key/value) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L2Config {
    pub enabled: bool,
    /// `redis://host:port` or `host:port`
    pub endpoint: String,
    pub password: Option<String>,
    pub ttl_seconds: u64,
    /// Pool size per node
    pub max_connections: usize,
    pub cluster_mode: bool,
    /// Node endpoints used when `cluster_mode` is set
    pub cluster_nodes: Vec<String>,
    /// Deadline for every L2 call
    pub timeout_ms: u64,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "redis://127.0.0.1:6379".to_string(),
            password: None,
            ttl_seconds: 3600,
            max_connections: 20,
            cluster_mode: false,
            cluster_nodes: Vec::new(),
            timeout_ms: 500,
        }
    }
}

impl L2Config {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Node endpoints to connect to
    pub fn nodes(&self) -> Vec<String> {
        if self.cluster_mode {
            self.cluster_nodes.clone()
        } else {
            vec![self.endpoint.clone()]
        }
    }
}

/// L3 (edge) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L3Config {
    pub enabled: bool,
    /// Edge API base URL
    pub endpoint: String,
    pub api_key: Option<String>,
    pub ttl_seconds: u64,
    /// Deadline for every L3 call
    pub timeout_ms: u64,
}

impl Default for L3Config {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: None,
            ttl_seconds: 86_400,
            timeout_ms: 2_000,
        }
    }
}

impl L3Config {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Entry re-populated by the cache warmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmEntry {
    pub key: String,
    pub content_type: ContentType,
    /// Strings are stored as-is, anything else as compact JSON
    pub value: serde_json::Value,
}

impl WarmEntry {
    /// Bytes written to the tiers
    pub fn payload(&self) -> Result<Bytes> {
        match &self.value {
            serde_json::Value::String(text) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            other => Ok(Bytes::from(serde_json::to_vec(other)?)),
        }
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// Complete cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1: L1Config,
    pub l2: L2Config,
    pub l3: L3Config,
    pub compression_enabled: bool,
    /// Payloads at or below this size are never compressed
    pub compression_threshold_bytes: usize,
    /// Policy for content types missing from `policies`
    pub default_policy: CachePolicy,
    pub policies: HashMap<ContentType, CachePolicy>,
    /// Replaces the built-in profile for a content type
    pub content_ttls: HashMap<ContentType, ContentProfile>,
    /// Entries kept warm by the background warmer
    pub warm_entries: Vec<WarmEntry>,
    pub warm_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut policies = HashMap::new();
        policies.insert(ContentType::ModelArtifact, CachePolicy::CacheAside);

        Self {
            l1: L1Config::default(),
            l2: L2Config::default(),
            l3: L3Config::default(),
            compression_enabled: true,
            compression_threshold_bytes: 1024,
            default_policy: CachePolicy::WriteThrough,
            policies,
            content_ttls: HashMap::new(),
            warm_entries: Vec::new(),
            warm_interval_seconds: 300,
        }
    }
}

impl CacheConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Defaults overlaid with the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay recognised `CACHE_*` variables from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(std::env::vars())
    }

    /// Defaults overlaid with the given variables
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        config.apply_vars(vars)?;
        Ok(config)
    }

    /// Overlay recognised variables; unknown names are ignored
    pub fn apply_vars<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in vars {
            let (name, value) = (name.as_ref(), value.as_ref().trim());
            match name {
                "CACHE_L1_ENABLED" => self.l1.enabled = parse_bool(name, value)?,
                "CACHE_L1_MAX_SIZE_MB" => self.l1.max_size_mb = parse_num(name, value)?,
                "CACHE_L1_MAX_ITEMS" => self.l1.max_items = parse_num(name, value)?,
                "CACHE_L1_TTL_SECONDS" => self.l1.ttl_seconds = parse_num(name, value)?,
                "CACHE_L2_ENABLED" => self.l2.enabled = parse_bool(name, value)?,
                "CACHE_L2_ENDPOINT" => self.l2.endpoint = value.to_string(),
                "CACHE_L2_PASSWORD" => self.l2.password = non_empty(value),
                "CACHE_L2_TTL_SECONDS" => self.l2.ttl_seconds = parse_num(name, value)?,
                "CACHE_L2_MAX_CONNECTIONS" => self.l2.max_connections = parse_num(name, value)?,
                "CACHE_L2_CLUSTER_MODE" => self.l2.cluster_mode = parse_bool(name, value)?,
                "CACHE_L2_CLUSTER_NODES" => {
                    self.l2.cluster_nodes = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                }
                "CACHE_L2_TIMEOUT_MS" => self.l2.timeout_ms = parse_num(name, value)?,
                "CACHE_L3_ENABLED" => self.l3.enabled = parse_bool(name, value)?,
                "CACHE_L3_ENDPOINT" => self.l3.endpoint = value.to_string(),
                "CACHE_L3_API_KEY" => self.l3.api_key = non_empty(value),
                "CACHE_L3_TTL_SECONDS" => self.l3.ttl_seconds = parse_num(name, value)?,
                "CACHE_L3_TIMEOUT_MS" => self.l3.timeout_ms = parse_num(name, value)?,
                "CACHE_COMPRESSION_ENABLED" => self.compression_enabled = parse_bool(name, value)?,
                "CACHE_COMPRESSION_THRESHOLD_BYTES" => {
                    self.compression_threshold_bytes = parse_num(name, value)?
                }
                "CACHE_WARM_INTERVAL_SECONDS" => self.warm_interval_seconds = parse_num(name, value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject configurations no tier could honour
    pub fn validate(&self) -> Result<()> {
        if self.l1.enabled {
            if self.l1.max_items == 0 {
                return Err(Error::Config("l1.max_items must be greater than 0".into()));
            }
            if self.l1.max_size_mb == 0 {
                return Err(Error::Config("l1.max_size_mb must be greater than 0".into()));
            }
            if self.l1.ttl_seconds == 0 {
                return Err(Error::Config("l1.ttl_seconds must be greater than 0".into()));
            }
        }

        if self.l2.enabled {
            if self.l2.max_connections == 0 {
                return Err(Error::Config("l2.max_connections must be greater than 0".into()));
            }
            if self.l2.ttl_seconds == 0 || self.l2.timeout_ms == 0 {
                return Err(Error::Config("l2 ttl and timeout must be greater than 0".into()));
            }
            if self.l2.cluster_mode && self.l2.cluster_nodes.is_empty() {
                return Err(Error::Config("l2.cluster_mode requires cluster_nodes".into()));
            }
            if !self.l2.cluster_mode && self.l2.endpoint.is_empty() {
                return Err(Error::Config("l2.endpoint must be set".into()));
            }
        }

        if self.l3.enabled {
            if self.l3.endpoint.is_empty() {
                return Err(Error::Config("l3.endpoint must be set when l3 is enabled".into()));
            }
            if self.l3.ttl_seconds == 0 || self.l3.timeout_ms == 0 {
                return Err(Error::Config("l3 ttl and timeout must be greater than 0".into()));
            }
        }

        if !self.warm_entries.is_empty() && self.warm_interval_seconds == 0 {
            return Err(Error::Config("warm_interval_seconds must be greater than 0".into()));
        }

        Ok(())
    }

    /// Seconds between warm runs
    pub fn warm_interval(&self) -> Duration {
        Duration::from_secs(self.warm_interval_seconds)
    }

    /// Consistency policy for a content type
    pub fn policy_for(&self, content_type: ContentType) -> CachePolicy {
        self.policies
            .get(&content_type)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Tier usage and TTLs for a content type (override or built-in)
    pub fn profile_for(&self, content_type: ContentType) -> ContentProfile {
        self.content_ttls
            .get(&content_type)
            .copied()
            .unwrap_or_else(|| content_type.profile())
    }

    /// Whether a tier is switched on
    pub fn tier_enabled(&self, tier: CacheTier) -> bool {
        match tier {
            CacheTier::L1 => self.l1.enabled,
            CacheTier::L2 => self.l2.enabled,
            CacheTier::L3 => self.l3.enabled,
        }
    }

    /// TTL to use at a tier for a content type, or `None` when the tier is
    /// disabled or the content type does not use it
    pub fn effective_ttl(&self, content_type: ContentType, tier: CacheTier) -> Option<Duration> {
        if !self.tier_enabled(tier) {
            return None;
        }
        if tier == CacheTier::L3 && !content_type.is_edge_eligible() {
            return None;
        }
        self.profile_for(content_type).ttl_for(tier)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{}: expected boolean, got '{}'", name, other))),
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{}: expected number, got '{}'", name, value)))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

// =============================================================================
// Tests
// =============================================================================
