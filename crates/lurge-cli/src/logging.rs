use lurge_core::AppConfig;
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_NAME: &str = "lurge.log";

/// Where the log file goes: `LOG_FILE_PATH` if set, otherwise
/// `lurge.log` under the configured log directory.
fn log_file(config: &AppConfig) -> (PathBuf, String) {
    match env::var("LOG_FILE_PATH").map(PathBuf::from) {
        Ok(path) => {
            let dir = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| LOG_FILE_NAME.to_string());
            (dir, name)
        }
        Err(_) => (config.log_dir.clone(), LOG_FILE_NAME.to_string()),
    }
}

/// Terse stdout for the operator, and a daily file for the record. Volume
/// and worker threads are named `lurge-v{volume}-w{worker}`, so the file
/// layer keeps thread names to tell concurrent volumes apart.
pub fn init_logger(config: &AppConfig) -> WorkerGuard {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let (dir, name) = log_file(config);
    let file_appender = tracing_appender::rolling::daily(&dir, &name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .compact()
                .with_target(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_thread_names(true)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter_layer)
        .init();

    info!("Logging to {}", dir.join(&name).display());

    guard
}
