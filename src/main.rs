//! AI Proxy Server - Main entry point
//!
//! Builds the runtime, loads configuration from the environment and serves
//! the provider routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ai_proxy_rust::{core::init_metrics, router, AppConfig, AppState};
use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1);

    // One connection-handling thread unless more are asked for
    let runtime = if worker_threads > 1 {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()?
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
    };

    runtime.block_on(async_main(worker_threads))
}

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing() {
    let no_color = std::env::var("NO_COLOR").is_ok();

    // hyper/h2/reqwest are always quieted, even when RUST_LOG is set
    let base_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,ai_proxy_rust=debug".to_string());
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTime)
                .with_ansi(!no_color),
        )
        .init();
}

async fn async_main(worker_threads: usize) -> Result<()> {
    init_tracing();
    init_metrics();

    let config = AppConfig::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.server.host, config.server.port))?;

    let http_client = create_http_client(&config)?;
    let state = Arc::new(AppState::new(config, http_client));
    let app = router(state);

    tracing::info!(worker_threads, "Starting AI proxy on {}", addr);
    tracing::info!("Provider routes: /openai, /groq, /anthropic, /ollama/chat, /custom");
    tracing::info!("Control routes: /check, /api-keys, /cancel");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn create_http_client(config: &AppConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(!config.verify_ssl)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60));

    if let Some(secs) = config.upstream_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder.build().context("Failed to build HTTP client")
}
