crate::config_group!({

    /// The number of objects the transfer adapter may move at the same time.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_CONCURRENT_TRANSFERS` to set this value.
    ref concurrent_transfers: usize = 8;

    /// How many objects are sent to the batch API in one request.  A value of 0 sends
    /// every object in its own request.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_BATCH_SIZE` to set this value.
    ref batch_size: usize = 100;

    /// The number of times a failed object is retried before it is reported as an error.
    /// Values below 1 are treated as 1.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_MAX_RETRIES` to set this value.
    ref max_retries: i64 = 1;

    /// Set when the remote uses an authentication scheme that cannot tolerate repeated
    /// attempts (e.g. NTLM); forces max_retries to exactly 1.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_FORCE_SINGLE_RETRY` to set this value.
    ref force_single_retry: bool = false;

    /// Upper bound, in seconds, on the delay before a failed object is retried.  Delays start
    /// at 250ms and double with every retry of the same object.  0 retries immediately.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_MAX_RETRY_DELAY` to set this value.
    ref max_retry_delay: u64 = 10;

    /// Report every object as transferred without moving any data.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_DRY_RUN` to set this value.
    ref dry_run: bool = false;

    /// Only advertise the "basic" transfer adapter to the server.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_BASIC_TRANSFERS_ONLY` to set this value.
    ref basic_transfers_only: bool = false;

    /// If set, per-object byte progress is appended to this file as
    /// `<direction> <n>/<total> <read>/<size> <name>` lines.  `{PID}` and `~` are expanded.
    ///
    /// Use the environment variable `GIT_LFS_TRANSFER_PROGRESS_LOG` to set this value.
    ref progress_log: Option<String> = None;
});
