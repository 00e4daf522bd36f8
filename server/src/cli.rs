//! # CLI Interface
//!
//! Defines the command-line argument structure for `souk-server` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use souk_ledger::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT, DEFAULT_PUSH_ENDPOINT};

/// Souk wallet ledger service.
///
/// Serves the wallet, transfer, friend-graph, and loyalty API for the Souk
/// commerce platform, dispatches push notifications, and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "souk-server",
    about = "Souk wallet ledger service",
    version,
    propagate_version = true
)]
pub struct SoukCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the souk-server binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the ledger service.
    Run(RunArgs),
    /// Initialize a new data directory.
    Init(InitArgs),
    /// Query the status of a running service via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory where the ledger database is stored.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "SOUK_DATA_DIR", default_value = "~/.souk")]
    pub data_dir: PathBuf,

    /// Port for the REST/WebSocket API.
    #[arg(long, env = "SOUK_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SOUK_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Push-gateway endpoint notifications are POSTed to.
    #[arg(long, env = "SOUK_PUSH_ENDPOINT", default_value = DEFAULT_PUSH_ENDPOINT)]
    pub push_endpoint: String,

    /// Disable push dispatch entirely. Useful for local development where
    /// the gateway would reject made-up tokens anyway.
    #[arg(long, env = "SOUK_PUSH_DISABLED", default_value_t = false)]
    pub no_push: bool,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "SOUK_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "SOUK_DATA_DIR", default_value = "~/.souk")]
    pub data_dir: PathBuf,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running service.
    #[arg(long, default_value = "http://127.0.0.1:8470")]
    pub api_url: String,
}
