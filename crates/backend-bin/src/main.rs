// ============================
// kabuport-backend-bin/src/main.rs
// ============================
//! Tokio / Axum entry-point for the kabuport edge server.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kabuport_backend_lib::{config::Settings, router, AppState};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kabuport", version, about = "Request gate and API for the kabuport portfolio app")]
struct Args {
    /// Settings file (toml, yaml or json); defaults to ./config.*
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding `server.bind_addr`
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load().context("loading settings")?,
    };
    if let Some(bind) = args.bind {
        settings.server.bind_addr = bind;
    }

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| settings.server.log_level.clone()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let addr = settings.server.bind_addr;
    let state = AppState::new(settings).context("building application state")?;
    let app = router::create_router(Arc::new(state));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
