// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Souk Ledger Service
//!
//! Entry point for the `souk-server` binary. Parses CLI arguments,
//! initializes logging and metrics, opens the ledger database, and serves
//! the HTTP/WS API.
//!
//! The binary supports four subcommands:
//!
//! - `run`     — start the ledger service
//! - `init`    — initialize the data directory
//! - `status`  — query a running service's status endpoint
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod push;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use souk_ledger::ledger::Ledger;
use souk_ledger::store::LedgerDb;

use cli::{Commands, SoukCli};
use logging::LogFormat;
use metrics::ServiceMetrics;
use push::{DisabledPushGateway, HttpPushGateway, PushGateway};

/// Capacity of the ledger-event broadcast channel. A subscriber that falls
/// more than this far behind starts lagging and is told so; 256 absorbs any
/// realistic burst of wallet activity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How often the background task refreshes store-derived gauges.
const GAUGE_REFRESH_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = SoukCli::parse();

    match cli.command {
        Commands::Run(args) => run_service(args).await,
        Commands::Init(args) => init_data_dir(args),
        Commands::Status(args) => query_status(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full ledger service: API server, metrics endpoint, and the
/// gauge refresh loop.
async fn run_service(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "souk_server=info,souk_ledger=info,tower_http=debug",
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        push_enabled = !args.no_push,
        "starting souk-server"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;

    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    let ledger = Arc::new(Ledger::new(db));

    // --- Metrics ---
    let service_metrics = Arc::new(ServiceMetrics::new());
    service_metrics
        .user_count
        .set(ledger.db().user_count() as i64);

    // --- Event broadcast ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    // --- Push gateway ---
    let push: Arc<dyn PushGateway> = if args.no_push {
        tracing::info!("push dispatch disabled");
        Arc::new(DisabledPushGateway)
    } else {
        tracing::info!(endpoint = %args.push_endpoint, "push dispatch enabled");
        Arc::new(HttpPushGateway::new(args.push_endpoint.clone()))
    };

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger: Arc::clone(&ledger),
        events: event_tx,
        metrics: Arc::clone(&service_metrics),
        push,
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind api listener on {}", api_addr))?;
    tracing::info!(addr = %api_addr, "api server listening");

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&service_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!(addr = %metrics_addr, "metrics server listening");

    // --- Gauge refresh loop ---
    // Store-derived gauges drift as handlers mutate the database; this loop
    // reconciles them on a fixed cadence.
    let ledger_ref = Arc::clone(&ledger);
    let metrics_ref = Arc::clone(&service_metrics);
    let gauge_loop = tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(GAUGE_REFRESH_SECS));
        loop {
            interval.tick().await;
            metrics_ref
                .user_count
                .set(ledger_ref.db().user_count() as i64);
            tracing::debug!("gauges refreshed");
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("api server exited with error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server exited with error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    gauge_loop.abort();
    if let Err(e) = ledger.db().flush() {
        tracing::error!("final flush failed: {}", e);
    }
    tracing::info!("souk-server stopped");
    Ok(())
}

/// Initializes a new data directory and verifies the database opens.
fn init_data_dir(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("souk_server=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing data directory");

    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create data directory: {}", db_path.display()))?;

    // Open once so first `run` starts against a valid database.
    let db = LedgerDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    db.flush().context("failed to flush new database")?;

    println!("Data directory initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Database       : {}", db_path.display());
    println!("  Users          : {}", db.user_count());

    Ok(())
}

/// Queries a running service's status endpoint and prints the result.
async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let url = format!("{}/status", args.api_url.trim_end_matches('/'));
    let body = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {}", url))?
        .text()
        .await
        .context("failed to read status response body")?;
    println!("{}", body);
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("souk-server {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Resolves when the process receives SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
