//! # Structured Logging
//!
//! tracing-subscriber setup for the ledger service. Output goes to stderr
//! so stdout stays clean for the `status` subcommand's JSON, and the format
//! is switchable between human-readable lines for a terminal and JSON lines
//! for a log aggregator.
//!
//! Filtering follows the usual `RUST_LOG` directives; when the variable is
//! unset, the level passed by the caller applies. A useful development
//! setting:
//!
//! ```text
//! RUST_LOG=souk_server=debug,souk_ledger=debug,tower_http=debug
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output with file/line context for local runs.
    Pretty,
    /// JSON lines for production log pipelines.
    Json,
}

impl LogFormat {
    /// Parses a format name, case-insensitively. Anything that isn't
    /// `"json"` falls back to `Pretty` rather than failing startup over a
    /// typo in an env var.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Installs the global tracing subscriber. Call once from `main`; a second
/// call panics, which is the bug you want to hear about.
pub fn init_logging(default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
    }

    tracing::info!(?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lossy() {
        assert_eq!(LogFormat::from_str_lossy("json"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("garbage"), LogFormat::Pretty);
    }
}
