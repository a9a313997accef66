use lfs_logging::{init_logging, LoggingConfig, LoggingMode};

// Installing a global subscriber can happen once per process, so this binary holds a single test.
#[test]
fn test_init_logging_to_nested_file() {
    let tmp = tempfile::tempdir().unwrap();
    let log_file = tmp.path().join("nested").join("dir").join("transfer.log");

    init_logging(LoggingConfig {
        logging_mode: LoggingMode::File(log_file.clone()),
        use_json: true,
        version: "lfs-transfer test".to_owned(),
    });

    assert!(log_file.exists());
    tracing::info!("written after init");
}
