//! # Tracing Setup
//!
//! Environment-aware console logging using the tracing ecosystem. Designed
//! for containerized deployments where logs go to stdout and the collector
//! handles shipping.
//!
//! Configuration comes from the environment:
//! - `LOG_LEVEL` (or `RUST_LOG` with full directive syntax) sets the filter
//! - `LOG_FORMAT=json` switches to newline-delimited JSON output
//!
//! Safe to call multiple times; only the first call installs the subscriber.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

fn log_filter() -> String {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        return level.to_lowercase();
    }
    if let Ok(directives) = std::env::var("RUST_LOG") {
        return directives;
    }
    "info".to_string()
}

/// Initialize the global tracing subscriber for console output.
///
/// ANSI colors are enabled only when stdout is a TTY. A subscriber installed
/// elsewhere (for example by a test harness) wins silently.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let filter = log_filter();
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());
        let json_output = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if json_output {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_filter(EnvFilter::new(&filter));

            if tracing_subscriber::registry().with(layer).try_init().is_ok() {
                tracing::info!(filter = %filter, format = "json", "Tracing initialized");
            }
        } else {
            let layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(use_ansi)
                .with_filter(EnvFilter::new(&filter));

            if tracing_subscriber::registry().with(layer).try_init().is_ok() {
                tracing::info!(filter = %filter, ansi_colors = use_ansi, "Tracing initialized");
            }
        }
    });
}
