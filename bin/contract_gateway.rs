//! # Contract Gateway Service
//!
//! Serves read-only contract state over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin contract_gateway -- --config Config.toml --port 3000
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`). Press Ctrl+C to stop
//! gracefully.

use anyhow::{Context, Result};
use clap::Parser;
use contract_state_gateway::{
    api::{self, AppState},
    ArweaveGateway, ContractReadService, ContractValidator, RemoteEvaluationEngine, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "contract_gateway", about = "Read-only contract state gateway")]
struct Args {
    /// Path to a TOML settings file (defaults to ./Config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `server.port`
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.context("failed to initialise logging")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.json_logs)?;

    let mut settings = match args.config {
        Some(ref path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::new().context("failed to load settings")?,
    };
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let chain = Arc::new(
        ArweaveGateway::new(&settings.gateway.url, settings.gateway_request_timeout())
            .context("failed to build gateway client")?,
    );
    let engine = Arc::new(
        RemoteEvaluationEngine::new(&settings.evaluator.url, settings.evaluator_request_timeout())
            .context("failed to build evaluator client")?,
    );

    let service = Arc::new(ContractReadService::from_settings(
        &settings,
        engine,
        chain.clone(),
    ));
    let validator = ContractValidator::new(service.clone(), settings.evaluation_timeout());
    let app = api::router(AppState::new(service, validator, chain));

    let bind_address = settings.bind_address();
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;

    info!(
        address = %bind_address,
        gateway = %settings.gateway.url,
        evaluator = %settings.evaluator.url,
        evaluation_timeout_ms = settings.evaluation.timeout_ms,
        "Contract gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Contract gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining connections");
}
