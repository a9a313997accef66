use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::normalized_path_from_user_string;

/// A trait to control how a value is parsed from an environment string or other config source
/// if it's present.
pub trait ParsableConfigValue: std::fmt::Debug + Sized {
    fn parse_user_value(value: &str) -> Option<Self>;

    /// Parse the value, returning the default if it can't be parsed or the string is missing.
    /// Issue a warning if it can't be parsed.
    fn parse(variable_name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            Some(v) => match Self::parse_user_value(&v) {
                Some(v) => {
                    info!("Config: {variable_name} = {v:?} (user set)");
                    v
                },
                None => {
                    warn!(
                        "Configuration value {v} for {variable_name} cannot be parsed into correct type; reverting to default."
                    );
                    info!("Config: {variable_name} = {default:?} (default due to parse error)");
                    default
                },
            },
            None => {
                debug!("Config: {variable_name} = {default:?} (default)");
                default
            },
        }
    }
}

/// Most values work with the FromStr implementation, but bool, Option<T> and paths
/// get custom parsing behavior below.
pub trait FromStrParseable: FromStr + std::fmt::Debug {}

impl<T: FromStrParseable> ParsableConfigValue for T {
    fn parse_user_value(value: &str) -> Option<Self> {
        value.trim().parse::<T>().ok()
    }
}

impl FromStrParseable for usize {}
impl FromStrParseable for u32 {}
impl FromStrParseable for u64 {}
impl FromStrParseable for isize {}
impl FromStrParseable for i32 {}
impl FromStrParseable for i64 {}
impl FromStrParseable for f64 {}
impl FromStrParseable for String {}

/// Accepted spellings, case-insensitive:
/// - true: "1","true","yes","y","on"
/// - false: "0","false","no","n","off"
pub fn parse_bool_value(value: &str) -> Option<bool> {
    let t = value.trim().to_ascii_lowercase();

    match t.as_str() {
        "0" | "false" | "no" | "n" | "off" => Some(false),
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        _ => None,
    }
}

impl ParsableConfigValue for bool {
    fn parse_user_value(value: &str) -> Option<Self> {
        parse_bool_value(value)
    }
}

/// Allows the default to be None when nothing is set, and Some(value) when the user
/// specifies one.
impl<T: ParsableConfigValue> ParsableConfigValue for Option<T> {
    fn parse_user_value(value: &str) -> Option<Self> {
        T::parse_user_value(value).map(Some)
    }
}

impl ParsableConfigValue for PathBuf {
    fn parse_user_value(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        Some(normalized_path_from_user_string(value))
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    fn test_bool_spellings() {
        for s in ["1", "true", "TRUE", " yes ", "y", "On"] {
            assert_eq!(parse_bool_value(s), Some(true), "{s}");
        }
        for s in ["0", "false", "No", "n", "off"] {
            assert_eq!(parse_bool_value(s), Some(false), "{s}");
        }
        assert_eq!(parse_bool_value("maybe"), None);
        assert_eq!(parse_bool_value(""), None);
    }

    #[test]
    fn test_numeric_parse() {
        assert_eq!(usize::parse("N", Some("42".to_owned()), 8), 42);
        assert_eq!(i64::parse("N", Some("-3".to_owned()), 1), -3);
        assert_eq!(usize::parse("N", None, 8), 8);
    }

    #[test]
    #[traced_test]
    fn test_unparsable_reverts_to_default() {
        assert_eq!(usize::parse("batch_size", Some("lots".to_owned()), 100), 100);
        assert!(logs_contain("cannot be parsed into correct type"));
    }

    #[test]
    fn test_option_parse() {
        assert_eq!(<Option<String>>::parse("N", None, None), None);
        assert_eq!(<Option<String>>::parse("N", Some("json".to_owned()), None), Some("json".to_owned()));
        assert_eq!(<Option<usize>>::parse("N", Some("x".to_owned()), Some(3)), Some(3));
    }
}
