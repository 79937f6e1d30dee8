//! Cache Model Types
//!
//! Content classification, consistency policy, tier identity and the entry
//! record each tier stores its own copy of.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Tier
// =============================================================================

/// Cache tier identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// L1 - in-process memory
    L1,
    /// L2 - shared key/value network service
    L2,
    /// L3 - edge / CDN
    L3,
}

impl CacheTier {
    /// Short label used in logs and metric labels
    pub fn label(&self) -> &'static str {
        match self {
            CacheTier::L1 => "l1",
            CacheTier::L2 => "l2",
            CacheTier::L3 => "l3",
        }
    }
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "L1 (Memory)"),
            CacheTier::L2 => write!(f, "L2 (Distributed)"),
            CacheTier::L3 => write!(f, "L3 (Edge)"),
        }
    }
}

// =============================================================================
// Content Type
// =============================================================================

/// Classifies what a cached payload is. The engine never looks inside the
/// payload; the classifier only drives TTLs, tier selection and policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    AudioTranscription,
    AiResponse,
    EmotionAnalysis,
    VoiceSynthesis,
    StaticAsset,
    UserSession,
    ModelArtifact,
    Configuration,
}

impl ContentType {
    /// Every content type, in declaration order
    pub const ALL: [ContentType; 8] = [
        ContentType::AudioTranscription,
        ContentType::AiResponse,
        ContentType::EmotionAnalysis,
        ContentType::VoiceSynthesis,
        ContentType::StaticAsset,
        ContentType::UserSession,
        ContentType::ModelArtifact,
        ContentType::Configuration,
    ];

    /// Stable identifier, also used as the cache key prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::AudioTranscription => "audio_transcription",
            ContentType::AiResponse => "ai_response",
            ContentType::EmotionAnalysis => "emotion_analysis",
            ContentType::VoiceSynthesis => "voice_synthesis",
            ContentType::StaticAsset => "static_asset",
            ContentType::UserSession => "user_session",
            ContentType::ModelArtifact => "model_artifact",
            ContentType::Configuration => "configuration",
        }
    }

    /// Large, rarely-changing, non-sensitive payloads that may live on the edge
    pub fn is_edge_eligible(&self) -> bool {
        matches!(self, ContentType::StaticAsset | ContentType::ModelArtifact)
    }

    /// Built-in tier usage and TTLs for this content type
    pub fn profile(&self) -> ContentProfile {
        const MIN: u64 = 60;
        const HOUR: u64 = 60 * MIN;
        const DAY: u64 = 24 * HOUR;

        let (l1, l2, l3) = match self {
            ContentType::AudioTranscription => (Some(5 * MIN), Some(HOUR), None),
            ContentType::AiResponse => (Some(10 * MIN), Some(HOUR), None),
            ContentType::EmotionAnalysis => (Some(5 * MIN), Some(30 * MIN), None),
            ContentType::VoiceSynthesis => (Some(30 * MIN), Some(DAY), None),
            ContentType::StaticAsset => (Some(HOUR), Some(DAY), Some(30 * DAY)),
            ContentType::UserSession => (Some(5 * MIN), Some(30 * MIN), None),
            ContentType::ModelArtifact => (None, Some(DAY), Some(7 * DAY)),
            ContentType::Configuration => (Some(HOUR), Some(DAY), None),
        };

        ContentProfile {
            l1_ttl: l1.map(Duration::from_secs),
            l2_ttl: l2.map(Duration::from_secs),
            l3_ttl: l3.map(Duration::from_secs),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        ContentType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| crate::error::Error::Config(format!("unknown content type: {}", s)))
    }
}

/// Per-tier TTLs for a content type. `None` means the tier is not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentProfile {
    #[serde(default, with = "opt_secs")]
    pub l1_ttl: Option<Duration>,
    #[serde(default, with = "opt_secs")]
    pub l2_ttl: Option<Duration>,
    #[serde(default, with = "opt_secs")]
    pub l3_ttl: Option<Duration>,
}

impl ContentProfile {
    /// TTL for a tier, if the tier is used
    pub fn ttl_for(&self, tier: CacheTier) -> Option<Duration> {
        match tier {
            CacheTier::L1 => self.l1_ttl,
            CacheTier::L2 => self.l2_ttl,
            CacheTier::L3 => self.l3_ttl,
        }
    }
}

/// Optional TTLs are written as whole seconds in config files
mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}

// =============================================================================
// Consistency Policy
// =============================================================================

/// Write fan-out and miss-fill behaviour, selected per content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CachePolicy {
    /// Write every enabled tier synchronously
    WriteThrough,
    /// Write L1 synchronously, lower tiers in the background
    WriteBack,
    /// Backfill upper tiers on read; writes behave like write-through
    ReadThrough,
    /// Caller populates explicitly; no implicit writes or backfill
    CacheAside,
}

impl CachePolicy {
    /// Whether a lower-tier hit should be copied into upper tiers
    pub fn backfills_on_read(&self) -> bool {
        !matches!(self, CachePolicy::CacheAside)
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CachePolicy::WriteThrough => "WRITE_THROUGH",
            CachePolicy::WriteBack => "WRITE_BACK",
            CachePolicy::ReadThrough => "READ_THROUGH",
            CachePolicy::CacheAside => "CACHE_ASIDE",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A stored value plus its bookkeeping. Each tier owns its own copy.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    value: Bytes,
    content_type: ContentType,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access_count: u64,
    last_accessed: DateTime<Utc>,
    size_bytes: u64,
    compressed: bool,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` from now. A zero TTL is bumped to one
    /// millisecond so `expires_at > created_at` always holds.
    pub fn new(
        key: impl Into<String>,
        value: Bytes,
        content_type: ContentType,
        ttl: Duration,
        size_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        let ttl = ttl.max(Duration::from_millis(1));
        let delta = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let expires_at = now
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            key: key.into(),
            value,
            content_type,
            created_at: now,
            expires_at,
            access_count: 0,
            last_accessed: now,
            size_bytes,
            compressed: false,
        }
    }

    /// Mark the stored value as compressed
    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stored value (cheap clone)
    #[inline]
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    #[inline]
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[inline]
    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    #[inline]
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    /// Bytes charged against the owning tier's capacity
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Record a read and return the new access count
    pub fn record_access(&mut self) -> u64 {
        self.access_count += 1;
        self.last_accessed = Utc::now();
        self.access_count
    }

    /// Check expiry against a given instant
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Check expiry against the wall clock
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Time left before expiry (zero once expired)
    pub fn remaining_ttl(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

// =============================================================================
// Tests
// =============================================================================
