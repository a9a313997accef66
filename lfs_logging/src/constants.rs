/// Default log level for the library to use. Override using the `RUST_LOG` env variable.
pub(crate) const DEFAULT_LOG_LEVEL_FILE: &str = "info";
pub(crate) const DEFAULT_LOG_LEVEL_CONSOLE: &str = "warn";

/// File name used when the configured destination names a directory.
pub(crate) const DEFAULT_LOG_FILE_NAME: &str = "lfs-transfer.log";
