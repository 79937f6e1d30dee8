//! TierCache Integration Tests
//!
//! End-to-end behaviour through the public API:
//! - Tiered read-through, invalidation and eviction
//! - Performance optimizer and health monitor scenarios

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

// =============================================================================
// Cache Orchestrator
// =============================================================================

mod cache_tests {
    use super::*;
    use tiercache::adapters::{InMemoryL2Client, InMemoryL3Client};
    use tiercache::cache::{CacheConfig, CacheOrchestrator, CacheTier, ContentType, L2Cache, L3Cache};
    use tiercache::domain::{L2Client, L3Client, MetricsSource};

    struct Stack {
        l2: Arc<InMemoryL2Client>,
        l3: Arc<InMemoryL3Client>,
        cache: CacheOrchestrator,
    }

    fn stack(mut config: CacheConfig) -> Stack {
        config.l3.enabled = true;
        let l2 = Arc::new(InMemoryL2Client::new());
        let l3 = Arc::new(InMemoryL3Client::new());
        let cache = CacheOrchestrator::with_tiers(
            config.clone(),
            Some(Arc::new(L2Cache::new(l2.clone(), &config))),
            Some(Arc::new(L3Cache::new(l3.clone(), &config.l3))),
        );
        Stack { l2, l3, cache }
    }

    #[tokio::test]
    async fn test_tiered_read_through() {
        let s = stack(CacheConfig::default());
        s.l2.set_with_expiry("ai_response:key", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        let first = s.cache.get("ai_response:key", ContentType::AiResponse).await;
        assert_eq!(first.as_deref(), Some(&b"v"[..]));
        assert_eq!(s.l2.get_calls(), 1);

        let second = s.cache.get("ai_response:key", ContentType::AiResponse).await;
        assert_eq!(second.as_deref(), Some(&b"v"[..]));
        assert_eq!(s.l2.get_calls(), 1, "second read must be served by L1");

        let snapshot = s.cache.metrics_snapshot();
        assert_eq!(snapshot.l1.hits, 1);
        assert_eq!(snapshot.l2.hits, 1);
        assert_eq!(snapshot.total_requests, 2);
    }

    #[tokio::test]
    async fn test_delete_propagates_to_every_tier() {
        let s = stack(CacheConfig::default());
        let report = s
            .cache
            .set("static_asset:logo.png", &b"png-bytes"[..], ContentType::StaticAsset)
            .await
            .unwrap();
        assert_eq!(report.written, vec![CacheTier::L1, CacheTier::L2, CacheTier::L3]);

        assert!(s.cache.delete("static_asset:logo.png").await);

        assert!(!s.cache.l1().contains("static_asset:logo.png"));
        assert!(s.l2.raw("static_asset:logo.png").is_none());
        assert!(!s.l3.contains("static_asset:logo.png"));
        assert!(s.cache.get("static_asset:logo.png", ContentType::StaticAsset).await.is_none());
        assert!(s.l3.get("static_asset:logo.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_l1_eviction_end_to_end() {
        let mut config = CacheConfig::default();
        config.l1.max_items = 2;
        config.l2.enabled = false;
        let cache = CacheOrchestrator::in_memory(config);

        for (key, value) in [("a", "1"), ("b", "2"), ("c", "3")] {
            cache.set(key, value.as_bytes().to_vec(), ContentType::AiResponse).await.unwrap();
        }

        assert!(cache.get("a", ContentType::AiResponse).await.is_none());
        assert_eq!(cache.get("b", ContentType::AiResponse).await.as_deref(), Some(&b"2"[..]));
        assert_eq!(cache.get("c", ContentType::AiResponse).await.as_deref(), Some(&b"3"[..]));
        assert_eq!(cache.l1().evictions(), 1);
    }

    #[tokio::test]
    async fn test_compressed_values_round_trip() {
        let mut config = CacheConfig::default();
        config.compression_threshold_bytes = 128;
        let s = stack(config);

        let transcript = b"the quick brown fox jumps over the lazy dog. ".repeat(50);
        s.cache
            .set("audio_transcription:1", transcript.clone(), ContentType::AudioTranscription)
            .await
            .unwrap();

        let stored = s.l2.raw("audio_transcription:1").unwrap();
        assert!(stored.starts_with(b"COMPRESSED:"));

        // Force the read to go to L2
        s.cache.l1().clear();
        let value = s.cache.get("audio_transcription:1", ContentType::AudioTranscription).await;
        assert_eq!(value.as_deref(), Some(transcript.as_slice()));
    }

    #[tokio::test]
    async fn test_degraded_tiers_are_invisible_to_readers() {
        let s = stack(CacheConfig::default());
        s.l2.set_failing(true);
        s.l3.set_failing(true);

        assert!(s.cache.get("static_asset:x", ContentType::StaticAsset).await.is_none());

        let report = s.cache.set("static_asset:x", &b"v"[..], ContentType::StaticAsset).await.unwrap();
        assert_eq!(report.written, vec![CacheTier::L1]);
        assert_eq!(report.failed, vec![CacheTier::L2, CacheTier::L3]);
        assert_eq!(s.cache.get("static_asset:x", ContentType::StaticAsset).await.as_deref(), Some(&b"v"[..]));
    }

    #[tokio::test]
    async fn test_upstream_request_api() {
        let cache = CacheOrchestrator::in_memory(CacheConfig::default());
        let request = serde_json::json!({"text": "hello", "lang": "en"});
        let same = serde_json::json!({"lang": "en", "text": "hello"});

        assert!(cache.lookup(ContentType::VoiceSynthesis, &request).await.is_none());
        cache.store(ContentType::VoiceSynthesis, &request, &b"audio"[..]).await.unwrap();
        assert_eq!(cache.lookup(ContentType::VoiceSynthesis, &same).await.as_deref(), Some(&b"audio"[..]));

        cache.invalidate(ContentType::VoiceSynthesis, &same).await.unwrap();
        assert!(cache.lookup(ContentType::VoiceSynthesis, &request).await.is_none());
    }
}

// =============================================================================
// Monitoring
// =============================================================================

mod monitoring_tests {
    use super::*;
    use tiercache::cache::{CacheConfig, CacheOrchestrator, ContentType};
    use tiercache::monitoring::{
        AlertLevel, AlertThresholds, HealthMonitor, HealthStatus, PerformanceMetrics, PerformanceOptimizer, Priority,
    };

    #[test]
    fn test_declining_hit_rate_recommendation() {
        let optimizer = PerformanceOptimizer::default();
        for hit_rate in [0.9, 0.8, 0.7, 0.5, 0.3] {
            optimizer.record_sample(PerformanceMetrics {
                hit_rate,
                miss_rate: 1.0 - hit_rate,
                ..Default::default()
            });
        }

        let recommendations = optimizer.generate_recommendations(&CacheConfig::default());
        let decline = recommendations
            .iter()
            .find(|r| r.title == "Investigate Hit Rate Decline")
            .expect("declining hit rate must be flagged");
        assert_eq!(decline.priority, Priority::High);

        // Sorted HIGH first
        let priorities: Vec<_> = recommendations.iter().map(|r| r.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn test_single_hit_rate_warning() {
        let optimizer = Arc::new(PerformanceOptimizer::default());
        optimizer.record_sample(PerformanceMetrics {
            hit_rate: 0.1,
            average_latency_ms: 50.0,
            ..Default::default()
        });

        let thresholds = AlertThresholds {
            hit_rate_min: 0.3,
            latency_max_ms: 200.0,
            ..Default::default()
        };
        let monitor = HealthMonitor::with_thresholds(optimizer, thresholds);

        let report = monitor.check_health();
        assert_eq!(report.overall_status, HealthStatus::Warning);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].level, AlertLevel::Warning);
        assert_eq!(report.alerts[0].metric, "hit_rate");
    }

    #[tokio::test]
    async fn test_report_from_live_cache() {
        let cache = CacheOrchestrator::in_memory(CacheConfig::default());
        cache.set("configuration:flags", &b"{}"[..], ContentType::Configuration).await.unwrap();
        for _ in 0..4 {
            cache.get("configuration:flags", ContentType::Configuration).await;
        }
        cache.get("configuration:missing", ContentType::Configuration).await;

        let optimizer = PerformanceOptimizer::default();
        optimizer.record_metrics(&cache);
        let report = optimizer.generate_report(&cache, cache.config());

        assert!((report.current_metrics.hit_rate - 0.8).abs() < 1e-9);
        assert!(report.summary.performance_score.is_some());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"summary\""));
        assert!(json.contains("\"recommendations\""));
    }
}
