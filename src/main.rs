//! TierCache Server
//!
//! Runs a cache orchestrator with its background monitoring and serves the
//! operator endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        TierCache Server                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Cache     │───▶│  Optimizer   │───▶│    Health    │       │
//! │  │ Orchestrator │    │  (recorder)  │    │   Monitor    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │         ▲                    │                    │              │
//! │         │              /report, /metrics     /health             │
//! │   L1 expiry sweeper                                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::cache::{CacheConfig, CacheOrchestrator};
use tiercache::domain::MetricsSource;
use tiercache::monitoring::{
    spawn_expiry_sweeper, spawn_recorder, spawn_warmer, CacheExporter, HealthMonitor, HealthStatus,
    PerformanceOptimizer,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// TierCache - multi-tier cache engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config file (environment variables override it)
    #[arg(long, env = "CACHE_CONFIG")]
    config: Option<String>,

    /// Operator endpoint bind address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: String,

    /// Seconds between performance samples
    #[arg(long, env = "SAMPLE_INTERVAL_SECONDS", default_value = "60")]
    sample_interval_seconds: u64,

    /// Hours of samples kept for trend analysis
    #[arg(long, env = "ANALYSIS_WINDOW_HOURS", default_value = "24")]
    analysis_window_hours: u64,

    /// Seconds between L1 expired-entry sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECONDS", default_value = "30")]
    sweep_interval_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

struct AppState {
    cache: Arc<CacheOrchestrator>,
    optimizer: Arc<PerformanceOptimizer>,
    health: Arc<HealthMonitor>,
    exporter: Arc<CacheExporter>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting TierCache");

    let config = load_config(&args)?;
    info!(
        "  L1: enabled={} max_items={} max_size={}MB",
        config.l1.enabled, config.l1.max_items, config.l1.max_size_mb
    );
    info!("  L2: enabled={} endpoint={}", config.l2.enabled, config.l2.endpoint);
    info!("  L3: enabled={} endpoint={}", config.l3.enabled, config.l3.endpoint);

    let cache = Arc::new(
        CacheOrchestrator::connect(config)
            .await
            .context("failed to start cache orchestrator")?,
    );
    let health_state = cache.tier_health();
    if health_state.l2_degraded {
        warn!("L2 is running on the in-process stand-in");
    }

    let optimizer = Arc::new(PerformanceOptimizer::new(Duration::from_secs(args.analysis_window_hours * 3600)));
    let health = Arc::new(HealthMonitor::new(optimizer.clone()));
    let exporter = Arc::new(CacheExporter::new().context("failed to build metrics registry")?);

    let token = CancellationToken::new();

    let recorder = spawn_recorder(
        cache.clone(),
        optimizer.clone(),
        health.clone(),
        Some(exporter.clone()),
        Duration::from_secs(args.sample_interval_seconds.max(1)),
        token.child_token(),
    );
    let sweeper = spawn_expiry_sweeper(
        cache.l1().clone(),
        Duration::from_secs(args.sweep_interval_seconds.max(1)),
        token.child_token(),
    );

    let warmer = (!cache.config().warm_entries.is_empty()).then(|| {
        spawn_warmer(
            cache.clone(),
            cache.config().warm_entries.clone(),
            cache.config().warm_interval(),
            token.child_token(),
        )
    });

    let state = Arc::new(AppState {
        cache: cache.clone(),
        optimizer,
        health,
        exporter,
    });
    let server = {
        let addr = args.listen_addr.clone();
        let token = token.child_token();
        tokio::spawn(async move {
            if let Err(e) = run_server(&addr, state, token).await {
                error!("Server error: {:#}", e);
            }
        })
    };

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    token.cancel();
    for handle in [recorder, sweeper, server].into_iter().chain(warmer) {
        if let Err(e) = handle.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }

    info!(pending = cache.pending_writes(), "Flushing write-back work");
    cache.flush_pending().await;

    info!("Shutdown complete");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path);
            CacheConfig::from_yaml_file(path).with_context(|| format!("failed to load {}", path))?
        }
        None => CacheConfig::default(),
    };
    config.apply_env().context("invalid cache environment")?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Operator Server
// =============================================================================

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn respond_json<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("serialization failed: {}", e),
        ),
    }
}

fn route(req: &Request<hyper::body::Incoming>, state: &AppState) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/healthz" | "/livez" => respond(StatusCode::OK, "text/plain", "ok"),
        "/readyz" => respond_json(StatusCode::OK, &state.cache.tier_health()),
        "/health" => {
            let report = state.health.check_health();
            let status = match report.overall_status {
                HealthStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::OK,
            };
            respond_json(status, &report)
        }
        "/report" => {
            let report = state
                .optimizer
                .generate_report(state.cache.as_ref(), state.cache.config());
            respond_json(StatusCode::OK, &report)
        }
        "/metrics" => {
            state.exporter.update(&state.cache.metrics_snapshot());
            match state.exporter.render() {
                Ok(text) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, text),
                Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
            }
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    }
}

async fn run_server(addr: &str, state: Arc<AppState>, token: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse().context("invalid listen address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("Operator server listening on {}", addr);

    loop {
        let (stream, _) = tokio::select! {
            _ = token.cancelled() => {
                info!("Operator server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted.context("accept failed")?,
        };

        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, std::convert::Infallible>(route(&req, &state)) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Connection error: {}", e);
            }
        });
    }
}
