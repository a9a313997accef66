use std::path::PathBuf;

use lfs_config::LogConfig;
use utils::normalized_path_from_user_string;

use crate::constants::DEFAULT_LOG_FILE_NAME;

#[derive(Clone, Debug, PartialEq)]
pub enum LoggingMode {
    File(PathBuf),
    Console,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub logging_mode: LoggingMode,
    pub use_json: bool,
    pub version: String,
}

impl LoggingConfig {
    /// Chooses the logging mode from the `log` config group.
    ///
    /// An unset or empty destination logs to the console.  A destination ending in a path
    /// separator, or naming an existing directory, gets a default file name inside it.
    pub fn from_config(log: &LogConfig, version: impl Into<String>) -> LoggingConfig {
        let logging_mode = match log.dest.as_deref() {
            None | Some("") => LoggingMode::Console,
            Some(dest) => {
                let path = normalized_path_from_user_string(dest);

                if dest.ends_with('/') || (cfg!(windows) && dest.ends_with('\\')) || path.is_dir() {
                    LoggingMode::File(path.join(DEFAULT_LOG_FILE_NAME))
                } else {
                    LoggingMode::File(path)
                }
            },
        };

        let use_json = match &log.format {
            Some(format) => format.trim().eq_ignore_ascii_case("json"),
            None => logging_mode != LoggingMode::Console,
        };

        Self {
            logging_mode,
            use_json,
            version: version.into(),
        }
    }

    pub fn console(version: impl Into<String>) -> LoggingConfig {
        Self {
            logging_mode: LoggingMode::Console,
            use_json: false,
            version: version.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_config(dest: Option<&str>, format: Option<&str>) -> LogConfig {
        let mut cfg = LogConfig::new();
        cfg.dest = dest.map(str::to_owned);
        cfg.format = format.map(str::to_owned);
        cfg
    }

    #[test]
    fn test_console_by_default() {
        let cfg = LoggingConfig::from_config(&log_config(None, None), "test");
        assert_eq!(cfg.logging_mode, LoggingMode::Console);
        assert!(!cfg.use_json);
        assert_eq!(cfg.version, "test");

        let cfg = LoggingConfig::from_config(&log_config(Some(""), None), "test");
        assert_eq!(cfg.logging_mode, LoggingMode::Console);
    }

    #[test]
    fn test_file_destination_defaults_to_json() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("transfer.log");

        let cfg = LoggingConfig::from_config(&log_config(dest.to_str(), None), "test");
        assert_eq!(cfg.logging_mode, LoggingMode::File(dest));
        assert!(cfg.use_json);
    }

    #[test]
    fn test_directory_destination_gets_file_name() {
        let tmp = tempfile::tempdir().unwrap();

        let cfg = LoggingConfig::from_config(&log_config(tmp.path().to_str(), Some("text")), "test");
        assert_eq!(cfg.logging_mode, LoggingMode::File(tmp.path().join(DEFAULT_LOG_FILE_NAME)));
        assert!(!cfg.use_json);
    }

    #[test]
    fn test_json_console() {
        let cfg = LoggingConfig::from_config(&log_config(None, Some(" JSON ")), "test");
        assert_eq!(cfg.logging_mode, LoggingMode::Console);
        assert!(cfg.use_json);
    }
}
