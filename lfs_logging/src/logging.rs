use std::ffi::OsStr;
use std::path::Path;
use std::sync::OnceLock;

use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::constants::{DEFAULT_LOG_FILE_NAME, DEFAULT_LOG_LEVEL_CONSOLE, DEFAULT_LOG_LEVEL_FILE};
use crate::{LoggingConfig, LoggingMode};

/// The main entry point to set up logging.  Should only be called once per process; later
/// calls leave the first subscriber in place.
pub fn init_logging(cfg: LoggingConfig) {
    match &cfg.logging_mode {
        LoggingMode::File(log_file) => {
            // Attempt logging to a file, but fall back to console logging on error.
            if let Err(e) = init_logging_to_file(log_file, cfg.use_json) {
                init_logging_to_console(&cfg);
                error!("Error logging to file {log_file:?} ({e}); falling back to console logging.");
            }
        },
        LoggingMode::Console => init_logging_to_console(&cfg),
    }

    info!("{}", &cfg.version);
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_default()
}

fn init_logging_to_console(cfg: &LoggingConfig) {
    let registry = tracing_subscriber::registry();

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_writer(std::io::stderr);
    let fmt_filter = env_filter(DEFAULT_LOG_LEVEL_CONSOLE);

    let result = if cfg.use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init()
    } else {
        registry.with(fmt_layer_base.pretty().with_filter(fmt_filter)).try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {e}");
    }
}

fn init_logging_to_file(path: &Path, use_json: bool) -> Result<(), std::io::Error> {
    let (path, file_name) = match path.file_name() {
        Some(name) => (path.to_path_buf(), name.to_owned()),
        None => (path.join(DEFAULT_LOG_FILE_NAME), OsStr::new(DEFAULT_LOG_FILE_NAME).to_owned()),
    };

    let log_directory = match path.parent() {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent.to_path_buf()
        },
        None => Path::new(".").to_path_buf(),
    };

    // Fail early if the location is not writeable so the caller can fall back to stderr.
    std::fs::OpenOptions::new().create(true).append(true).open(&path)?;

    // One static file, no rotation; the guard keeps the writer thread alive.
    let file_appender = rolling::never(log_directory, file_name);
    let (writer, guard) = non_blocking(file_appender);

    static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);
    let fmt_filter = env_filter(DEFAULT_LOG_LEVEL_FILE);

    let registry = tracing_subscriber::registry();
    let result = if use_json {
        registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init()
    } else {
        registry.with(fmt_layer_base.with_filter(fmt_filter)).try_init()
    };

    result.map_err(|e| std::io::Error::other(e.to_string()))
}
