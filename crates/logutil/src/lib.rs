//! Utilities for logging.
use std::io;

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Configure the global logger writing to stderr.
///
/// `RUST_LOG` directives take precedence over `level`. Calling this more than
/// once is a no-op.
pub fn configure_global_logger(level: Level, format: LogFormat) {
    configure_global_logger_with_writer(level, format, io::stderr)
}

pub fn configure_global_logger_with_writer<W>(level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(level))
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true);

    let result = match format {
        LogFormat::HumanReadable => {
            tracing::subscriber::set_global_default(builder.finish())
        }
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };

    // Already set, either by an earlier call or by the embedding application.
    let _ = result;
}

/// Install a logger that writes through the test harness capture.
///
/// Safe to call from every test.
pub fn init_test() {
    let subscriber = FmtSubscriber::builder()
        .with_test_writer()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_file(true)
        .with_line_number(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
