use std::env;
use std::ffi::OsStr;

/// Temporarily sets an environment variable, restoring the previous value (or absence) on drop.
///
/// Meant for tests that exercise environment-driven configuration; pair it with
/// `#[serial]` since the process environment is shared between test threads.
///
/// ```no_run
/// use utils::EnvVarGuard;
///
/// let _guard = EnvVarGuard::set("GIT_LFS_TRANSFER_BATCH_SIZE", "25");
/// // ... the variable is restored when `_guard` goes out of scope.
/// ```
pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = env::var(key).ok();
        unsafe {
            env::set_var(key, value);
        }
        Self { key, prev }
    }

    /// Removes the variable for the lifetime of the guard.
    pub fn unset(key: &'static str) -> Self {
        let prev = env::var(key).ok();
        unsafe {
            env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe {
                env::set_var(self.key, v);
            },
            None => unsafe {
                env::remove_var(self.key);
            },
        }
    }
}
