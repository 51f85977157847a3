//! Logging and tracing configuration
//!
//! stdout is reserved for the single structured result record each invocation
//! emits, so human-readable logs go to stderr and a file under the state
//! directory. Log level is controlled by `RUST_LOG`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use super::paths;

/// Initialize tracing for the CLI (stderr + state-dir file)
///
/// Returns the file writer guard; dropping it flushes buffered log lines, so
/// the caller should hold it for the life of the process.
pub fn init_cli() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wallet_pilot=info,warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let log_dir = paths::log_dir();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let appender = tracing_appender::rolling::never(&log_dir, "wallet-pilot.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        return Some(guard);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();

    None
}
