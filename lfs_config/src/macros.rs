/// Macro to create a configuration value group struct.
///
/// Usage:
/// ```rust
/// mod transfer {
///     lfs_config::config_group!({
///         ref batch_size: usize = 100;
///         ref progress_log: Option<String> = None;
///     });
/// }
///
/// let cfg = transfer::ConfigValueGroup::new();
/// assert_eq!(cfg.batch_size, 100);
/// ```
///
/// This creates a `ConfigValueGroup` struct with the given fields, a `Default` impl holding the
/// listed defaults, and `apply_env_overrides()`, which reads `GIT_LFS_<GROUP>_<FIELD>` where
/// `<GROUP>` is the last segment of the module the macro is invoked in.
#[macro_export]
macro_rules! config_group {
    ({
        $(
            $(#[$meta:meta])*
            ref $name:ident : $type:ty = $value:expr;
        )+
    }) => {
        #[allow(unused_imports)]
        use $crate::ParsableConfigValue;

        /// All configurable values of this group.
        #[derive(Debug, Clone, PartialEq)]
        pub struct ConfigValueGroup {
            $(
                $(#[$meta])*
                #[allow(non_snake_case)]
                pub $name: $type,
            )+
        }

        impl Default for ConfigValueGroup {
            fn default() -> Self {
                Self {
                    $(
                        $name: {
                            let v: $type = $value;
                            v
                        },
                    )+
                }
            }
        }

        impl ConfigValueGroup {
            /// Create a new instance with default values only (no environment variable overrides).
            pub fn new() -> Self {
                Self::default()
            }

            /// The environment variable prefix for this group, e.g. `GIT_LFS_TRANSFER`.
            pub fn env_prefix() -> String {
                let group_name = module_path!().split("::").last().unwrap_or("unknown");
                format!("GIT_LFS_{}", group_name.to_uppercase())
            }

            /// Apply environment variable overrides to this configuration group.
            ///
            /// Fields whose variable is unset or unparsable keep their current value.
            pub fn apply_env_overrides(&mut self) {
                let prefix = Self::env_prefix();

                $(
                    let env_var_name = format!("{}_{}", prefix, stringify!($name).to_uppercase());
                    let maybe_env_value = std::env::var(&env_var_name).ok();
                    let current: $type = self.$name.clone();
                    self.$name = <$type>::parse(&env_var_name, maybe_env_value, current);
                )+
            }

            /// Convenience constructor: defaults with environment overrides applied.
            pub fn from_env() -> Self {
                let mut s = Self::default();
                s.apply_env_overrides();
                s
            }
        }
    };
}
