crate::config_group!({

    /// The log destination.  If unset or empty, logs go to the console; otherwise they are
    /// appended to this file.  `{PID}` and `~` are expanded.
    ///
    /// Use the environment variable `GIT_LFS_LOG_DEST` to set this value.
    ref dest: Option<String> = None;

    /// The format the logs are printed in. If "json", logs are dumped as json blobs; otherwise they
    /// are treated as text.  By default logging to files is done in json and console logging is done with text.
    ///
    /// Use the environment variable `GIT_LFS_LOG_FORMAT` to set this value.
    ref format: Option<String> = None;
});
