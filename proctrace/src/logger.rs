use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// `RUST_LOG` wins over the configured level, which wins over `info`.
fn resolve_filter(configured: Option<&str>) -> Result<(EnvFilter, String)> {
    let filter_str = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    let filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow!("Failed to parse log filter '{}': {}", filter_str, e))?;
    Ok((filter, filter_str))
}

/// Diagnostics go to stderr so stdout carries only event lines.
pub fn init_foreground_logging(configured_level: Option<&str>) -> Result<()> {
    let (env_filter, _) = resolve_filter(configured_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing subscriber: {}", e))?;
    Ok(())
}

pub fn init_daemon_logging(
    log_directory: &Path,
    configured_level: Option<&str>,
) -> Result<WorkerGuard> {
    let log_file_name_prefix = "proctrace.log";

    let file_appender = tracing_appender::rolling::daily(log_directory, log_file_name_prefix);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let (env_filter, filter_str) = resolve_filter(configured_level)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(
        "Logging system initialized. Log directory: {}",
        log_directory.display()
    );
    tracing::info!("Log filter: '{}'", filter_str);

    Ok(guard)
}
