//! rolebridge-server - Main entry point
//!
//! HTTP service translating between product and engineering language with an
//! upstream chat model, streamed over SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rolebridge_common::audit::{AuditSink, JsonlAuditSink, TracingAuditSink};
use rolebridge_common::config::load_config;
use rolebridge_server::llm::{AuditedGateway, OpenAiCompatibleGateway};
use rolebridge_server::logging::LogFilter;
use rolebridge_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};

/// Command-line arguments for rolebridge-server
#[derive(Parser, Debug)]
#[command(name = "rolebridge-server")]
#[command(about = "Streaming PM/engineer translation service")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long, env = "ROLEBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind (overrides config file)
    #[arg(long, env = "ROLEBRIDGE_HOST")]
    host: Option<String>,

    /// Port to listen on (overrides config file)
    #[arg(short, long, env = "ROLEBRIDGE_PORT")]
    port: Option<u16>,

    /// JSON-lines audit log (overrides config file)
    #[arg(long)]
    audit_log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = LogFilter::init();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    log_filter
        .apply_level(&config.logging.level)
        .with_context(|| format!("Invalid log level {:?}", config.logging.level))?;

    info!(
        "Starting rolebridge-server v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Refuse to start without a usable upstream
    let upstream = config
        .upstream
        .validate()
        .context("Upstream model endpoint is not configured")?;

    let audit: Arc<dyn AuditSink> = match args.audit_log.or(config.server.audit_log.clone()) {
        Some(path) => Arc::new(
            JsonlAuditSink::open(&path)
                .with_context(|| format!("Failed to open audit log {}", path.display()))?,
        ),
        None => {
            warn!("No audit log configured, audit records go to the tracing log");
            Arc::new(TracingAuditSink)
        }
    };

    let gateway = OpenAiCompatibleGateway::new(upstream, &config.limits)
        .context("Failed to build upstream HTTP client")?;
    let gateway = Arc::new(AuditedGateway::new(gateway, audit.clone()));

    let state = AppState::new(gateway, audit, config.limits.clone());
    let app = build_router(state);

    let host = args.host.unwrap_or(config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
