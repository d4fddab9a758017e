// warden/src/logging.rs
use std::fs;

use colored::Colorize;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use warden_common::Options;

/// Installs the global subscriber. Logs go to stderr, and additionally to
/// `<root>/debug.log` when a root directory is configured. The returned
/// guard flushes the file writer and must outlive all logging.
pub fn init(options: &Options, foreground: bool) -> Option<WorkerGuard> {
    let level_filter = if foreground || options.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let max_log_level = level_filter.into_level().unwrap_or(tracing::Level::INFO);

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("WARDEN_LOG")
        .from_env_lossy();

    let Some(log_path) = options.debug_log_path() else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(foreground)
            .try_init();
        return None;
    };

    let log_dir = log_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| options.root_dir());
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!(
            "{} Failed to create log directory {}: {}",
            "Error:".red().bold(),
            log_dir.display(),
            e
        );
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(foreground)
            .try_init();
        return None;
    }

    let file_appender = tracing_appender::rolling::never(&log_dir, "debug.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_writer = std::io::stderr.with_max_level(max_log_level);
    let file_writer = non_blocking_appender.with_max_level(max_log_level);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr_writer.and(file_writer))
        .with_ansi(false)
        .try_init();

    tracing::debug!("Writing logs to: {}", log_path.display());
    Some(guard)
}
