#![cfg_attr(feature = "strict", deny(warnings))]

pub mod groups;
pub mod lfs_config;
pub mod macros;

// Re-exported for use inside the config_group macro.
pub use lfs_config::LfsConfig;
pub use utils::configuration_utils::ParsableConfigValue;

/// The transfer settings consumed by the transfer queue.
pub type TransferConfig = groups::transfer::ConfigValueGroup;

/// The logging settings consumed by lfs_logging.
pub type LogConfig = groups::log::ConfigValueGroup;
