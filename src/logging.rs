//! Logging configuration using tracing
//!
//! Structured logging to stderr, filtered through RUST_LOG.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable, one event per block
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize the tracing subscriber
///
/// Filtering comes from RUST_LOG, falling back to `default_directive`
/// (e.g. "info" for the server, "warn" for client commands).
///
/// # Example RUST_LOG values
/// - `RUST_LOG=debug` - Show debug and above
/// - `RUST_LOG=institution_catalog=trace` - Trace the catalog only
/// - `RUST_LOG=institution_catalog::catalog=debug,tower_http=info`
///
/// # Errors
/// Returns an error if the subscriber has already been initialized
pub fn init(format: LogFormat, default_directive: &str) -> crate::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .json(),
            )
            .try_init(),
    };

    result.map_err(|e| {
        crate::CatalogError::Config(format!("Failed to initialize tracing: {}", e))
    })
}

/// Initialize logging for tests (no-op if already initialized)
pub fn init_test() {
    let _ = init(LogFormat::Pretty, "warn");
}
