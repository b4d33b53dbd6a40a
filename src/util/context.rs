//! Global context for relbrew operations.
//!
//! Resolves the working directory and configuration file once per run so
//! commands share one view of where they are.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::util::config::{global_config_path, Config};
use crate::util::fs::find_file_with_extension;

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "RELBREW_CONFIG";

/// Used when no platform configuration directory exists.
const FALLBACK_CONFIG: &str = ".relbrew/config.toml";

#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    config_path: PathBuf,
}

impl GlobalContext {
    /// Context for the process working directory. `config_path` overrides
    /// the platform configuration file.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(GlobalContext::with_cwd(cwd, config_path))
    }

    pub fn with_cwd(cwd: PathBuf, config_path: Option<PathBuf>) -> Self {
        let config_path = config_path
            .or_else(global_config_path)
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|d| d.home_dir().join(FALLBACK_CONFIG))
                    .unwrap_or_else(|| cwd.join(FALLBACK_CONFIG))
            });
        GlobalContext { cwd, config_path }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration, writing the defaults on first use.
    pub fn load_config(&self) -> Result<Config> {
        Config::load_or_init(&self.config_path)
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        config.save(&self.config_path)
    }

    /// The package's `.cabal` file, searched for below the working directory.
    pub fn find_manifest(&self) -> Option<PathBuf> {
        find_file_with_extension(&self.cwd, "cabal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_override() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), Some(path.clone()));

        assert_eq!(ctx.config_path(), path);
        let mut config = ctx.load_config().unwrap();
        assert!(path.exists());

        config.set("hackage_username", "alice").unwrap();
        ctx.save_config(&config).unwrap();
        assert_eq!(ctx.load_config().unwrap().hackage_username, "alice");
    }

    #[test]
    fn test_find_manifest() {
        let tmp = TempDir::new().unwrap();
        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf(), None);
        assert!(ctx.find_manifest().is_none());

        std::fs::write(tmp.path().join("foo.cabal"), "name: foo\n").unwrap();
        assert_eq!(ctx.find_manifest(), Some(tmp.path().join("foo.cabal")));
    }
}
