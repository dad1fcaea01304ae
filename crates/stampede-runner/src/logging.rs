//! Logging setup
//!
//! Console layer (text or JSON) plus an optional daily-rotated file layer.
//! `RUST_LOG` takes precedence over the configured level.

use std::ffi::OsStr;
use std::path::Path;

use stampede_common::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

/// Build the env filter for `level`, honouring `RUST_LOG` when set
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. The returned guard must be held for the
/// life of the process or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let use_json = config.format == "json";

    let console_layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if use_json {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json(),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true),
        )
    };

    let mut guard = None;
    let file_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        match &config.file {
            Some(log_file) => {
                let file_appender = tracing_appender::rolling::daily(
                    log_file.parent().unwrap_or_else(|| Path::new(".")),
                    log_file.file_name().unwrap_or_else(|| OsStr::new("stampede.log")),
                );
                let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(file_guard);

                if use_json {
                    Some(Box::new(
                        tracing_subscriber::fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .json(),
                    ))
                } else {
                    Some(Box::new(
                        tracing_subscriber::fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false),
                    ))
                }
            }
            None => None,
        };

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
