use std::path::{Path, PathBuf};

/// Turns a path given by the user (environment variable, config file) into an absolute path.
///
/// `~` is expanded to the home directory and any `{PID}` placeholder (case-insensitive) is
/// replaced by the current process id, so several concurrent processes can be pointed
/// at the same log or progress file template.
pub fn normalized_path_from_user_string(path: impl AsRef<str>) -> PathBuf {
    let substituted = substitute_pid(path.as_ref(), std::process::id());

    let expanded = shellexpand::path::tilde(Path::new(&substituted));
    let expanded_path = expanded.as_ref();

    std::path::absolute(expanded_path).unwrap_or_else(|_| expanded_path.to_path_buf())
}

fn substitute_pid(template: &str, pid: u32) -> String {
    const PLACEHOLDER: &str = "{pid}";

    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.to_ascii_lowercase().find(PLACEHOLDER) {
        result.push_str(&rest[..idx]);
        result.push_str(&pid.to_string());
        rest = &rest[idx + PLACEHOLDER.len()..];
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;
    use crate::EnvVarGuard;

    #[test]
    fn test_pid_substitution_case_insensitive() {
        for pattern in ["log_{PID}.txt", "log_{pid}.txt", "log_{Pid}.txt"] {
            assert_eq!(substitute_pid(pattern, 12345), "log_12345.txt");
        }
        assert_eq!(substitute_pid("{pid}/{PID}", 7), "7/7");
        assert_eq!(substitute_pid("no_placeholder", 7), "no_placeholder");
    }

    #[test]
    fn test_relative_becomes_absolute() {
        let p = normalized_path_from_user_string("some/relative/progress.log");
        assert!(p.is_absolute());
        assert!(p.ends_with("some/relative/progress.log"));
    }

    #[cfg(unix)]
    #[test]
    #[serial(default_config_env)]
    fn test_tilde_expansion() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().to_str().unwrap().to_owned();
        let _guard = EnvVarGuard::set("HOME", &home);

        let p = normalized_path_from_user_string("~/lfs/progress.log");
        assert_eq!(p, tmp.path().join("lfs/progress.log"));
    }
}
