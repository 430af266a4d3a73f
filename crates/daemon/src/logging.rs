//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over `logging.filter`. Console output is `pretty` for
//! development or `json` for log shippers; the optional file output is
//! always JSON.

use crate::config::{LogFormat, LoggingSection};
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "jobctl.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init_logging(config: &LoggingSection) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .with_context(|| format!("Invalid log filter {:?}", config.filter))?;

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let dir = shellexpand::tilde(dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
