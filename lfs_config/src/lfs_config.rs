use crate::groups;

/// All configuration groups of the transfer workspace.
///
/// The struct is built once (usually with [`LfsConfig::from_env`]) and then passed by value or
/// reference to whatever needs it; nothing reads the environment behind the caller's back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LfsConfig {
    pub transfer: groups::transfer::ConfigValueGroup,
    pub log: groups::log::ConfigValueGroup,
}

impl LfsConfig {
    /// Defaults only; no environment variables are consulted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with every `GIT_LFS_<GROUP>_<FIELD>` override applied.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.transfer.apply_env_overrides();
        self.log.apply_env_overrides();
    }

    /// Turns on dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.transfer.dry_run = dry_run;
        self
    }
}
