#![allow(non_snake_case)]

use lfs_config::{config_group, LfsConfig};
use serial_test::serial;
use utils::EnvVarGuard;

mod example {
    use super::*;

    config_group!({
        /// Test integer value
        ref TEST_INT: usize = 42;

        /// Test signed value
        ref TEST_SIGNED: i64 = 1;

        /// Test string value
        ref TEST_STRING: String = "default".to_string();

        /// Test boolean value
        ref TEST_BOOL: bool = false;

        /// Test optional value
        ref TEST_OPTIONAL: Option<String> = None;
    });
}

#[test]
fn test_env_prefix_uses_module_name() {
    assert_eq!(example::ConfigValueGroup::env_prefix(), "GIT_LFS_EXAMPLE");
    assert_eq!(lfs_config::TransferConfig::env_prefix(), "GIT_LFS_TRANSFER");
    assert_eq!(lfs_config::LogConfig::env_prefix(), "GIT_LFS_LOG");
}

#[test]
#[serial(config_env)]
fn test_basic_configuration() {
    let _g1 = EnvVarGuard::unset("GIT_LFS_EXAMPLE_TEST_INT");
    let _g2 = EnvVarGuard::unset("GIT_LFS_EXAMPLE_TEST_STRING");
    let _g3 = EnvVarGuard::unset("GIT_LFS_EXAMPLE_TEST_BOOL");
    let _g4 = EnvVarGuard::unset("GIT_LFS_EXAMPLE_TEST_OPTIONAL");

    let config = example::ConfigValueGroup::from_env();
    assert_eq!(config.TEST_INT, 42);
    assert_eq!(config.TEST_STRING, "default");
    assert!(!config.TEST_BOOL);
    assert_eq!(config.TEST_OPTIONAL, None);
}

#[test]
#[serial(config_env)]
fn test_env_overrides() {
    let _g1 = EnvVarGuard::set("GIT_LFS_EXAMPLE_TEST_INT", "7");
    let _g2 = EnvVarGuard::set("GIT_LFS_EXAMPLE_TEST_STRING", "custom");
    let _g3 = EnvVarGuard::set("GIT_LFS_EXAMPLE_TEST_BOOL", "yes");
    let _g4 = EnvVarGuard::set("GIT_LFS_EXAMPLE_TEST_OPTIONAL", "json");
    let _g5 = EnvVarGuard::set("GIT_LFS_EXAMPLE_TEST_SIGNED", "-4");

    let config = example::ConfigValueGroup::from_env();
    assert_eq!(config.TEST_INT, 7);
    assert_eq!(config.TEST_STRING, "custom");
    assert!(config.TEST_BOOL);
    assert_eq!(config.TEST_OPTIONAL.as_deref(), Some("json"));
    assert_eq!(config.TEST_SIGNED, -4);
}

#[test]
#[serial(config_env)]
fn test_unparsable_value_keeps_current() {
    let _g = EnvVarGuard::set("GIT_LFS_EXAMPLE_TEST_INT", "not-a-number");

    let mut config = example::ConfigValueGroup::new();
    config.TEST_INT = 5;
    config.apply_env_overrides();
    assert_eq!(config.TEST_INT, 5);
}

#[test]
fn test_transfer_defaults() {
    let config = LfsConfig::new();
    assert_eq!(config.transfer.concurrent_transfers, 8);
    assert_eq!(config.transfer.batch_size, 100);
    assert_eq!(config.transfer.max_retries, 1);
    assert!(!config.transfer.force_single_retry);
    assert_eq!(config.transfer.max_retry_delay, 10);
    assert!(!config.transfer.dry_run);
    assert!(!config.transfer.basic_transfers_only);
    assert_eq!(config.transfer.progress_log, None);
    assert_eq!(config.log.dest, None);
    assert_eq!(config.log.format, None);
}

#[test]
#[serial(config_env)]
fn test_lfs_config_from_env() {
    let _g1 = EnvVarGuard::set("GIT_LFS_TRANSFER_BATCH_SIZE", "25");
    let _g2 = EnvVarGuard::set("GIT_LFS_TRANSFER_MAX_RETRIES", "0");
    let _g3 = EnvVarGuard::set("GIT_LFS_TRANSFER_DRY_RUN", "1");
    let _g4 = EnvVarGuard::set("GIT_LFS_LOG_FORMAT", "json");
    let _g5 = EnvVarGuard::unset("GIT_LFS_TRANSFER_CONCURRENT_TRANSFERS");
    let _g6 = EnvVarGuard::set("GIT_LFS_TRANSFER_MAX_RETRY_DELAY", "3");

    let config = LfsConfig::from_env();
    assert_eq!(config.transfer.batch_size, 25);
    // Clamping non-positive retry counts happens where the value is used.
    assert_eq!(config.transfer.max_retries, 0);
    assert!(config.transfer.dry_run);
    assert_eq!(config.transfer.concurrent_transfers, 8);
    assert_eq!(config.transfer.max_retry_delay, 3);
    assert_eq!(config.log.format.as_deref(), Some("json"));
}

#[test]
fn test_with_dry_run() {
    let config = LfsConfig::new().with_dry_run(true);
    assert!(config.transfer.dry_run);
    assert_eq!(config, LfsConfig::new().with_dry_run(true));
}
