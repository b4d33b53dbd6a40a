//! Configuration file support for relbrew.
//!
//! Configuration is a flat key-value TOML file, by default at
//! `<config dir>/relbrew/config.toml`. It is loaded once per run and saved
//! only on an explicit [`Config::set`] followed by [`Config::save`].

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Keys understood by [`Config::get`] and [`Config::set`].
pub const KEYS: &[&str] = &[
    "hackage_username",
    "hackage_password",
    "github_token",
    "default_formula_template",
    "bottle_platforms",
    "tap_dir",
    "test_command",
    "hash_max_attempts",
    "hash_retry_delay_secs",
];

/// Upper bound for `hash_retry_delay_secs`.
pub const MAX_RETRY_DELAY_SECS: u64 = 3600;

/// Keys whose values are never echoed back in full.
pub const SECRET_KEYS: &[&str] = &["hackage_password", "github_token"];

/// relbrew configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hackage account used for non-interactive uploads
    pub hackage_username: String,

    pub hackage_password: String,

    /// Token handed to `gh` for release uploads
    pub github_token: String,

    pub default_formula_template: String,

    /// Platform tags bottles are expected for (e.g. `arm64_monterey`)
    pub bottle_platforms: Vec<String>,

    /// Homebrew tap checkout; searched for in common locations when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap_dir: Option<PathBuf>,

    /// Command line that runs the package's test suite
    pub test_command: String,

    /// Download attempts when computing the published tarball's hash
    pub hash_max_attempts: u32,

    /// Backoff unit between download attempts, in seconds
    pub hash_retry_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hackage_username: String::new(),
            hackage_password: String::new(),
            github_token: String::new(),
            default_formula_template: "standard".to_string(),
            bottle_platforms: vec!["arm64_monterey".to_string()],
            tap_dir: None,
            test_command: "cabal test".to_string(),
            hash_max_attempts: 3,
            hash_retry_delay_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration, writing a default file first if none exists.
    ///
    /// A file that cannot be parsed is reported and replaced by defaults in
    /// memory; it is left untouched on disk.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            config.save(path)?;
            tracing::debug!("created default config at {}", path.display());
            return Ok(config);
        }

        Ok(Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
            Self::default()
        }))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize config")?;
        crate::util::fs::write_string(path, &contents)
            .with_context(|| format!("failed to write config: {}", path.display()))
    }

    /// Look up a value by key. Lists are joined with commas.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "hackage_username" => self.hackage_username.clone(),
            "hackage_password" => self.hackage_password.clone(),
            "github_token" => self.github_token.clone(),
            "default_formula_template" => self.default_formula_template.clone(),
            "bottle_platforms" => self.bottle_platforms.join(","),
            "tap_dir" => self
                .tap_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "test_command" => self.test_command.clone(),
            "hash_max_attempts" => self.hash_max_attempts.to_string(),
            "hash_retry_delay_secs" => self.hash_retry_delay_secs.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Set a value by key.
    ///
    /// Returns `Ok(false)` for unknown keys, and an error for values that do
    /// not parse for the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "hackage_username" => self.hackage_username = value.to_string(),
            "hackage_password" => self.hackage_password = value.to_string(),
            "github_token" => self.github_token = value.to_string(),
            "default_formula_template" => self.default_formula_template = value.to_string(),
            "bottle_platforms" => {
                self.bottle_platforms = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
            }
            "tap_dir" => {
                self.tap_dir = if value.trim().is_empty() {
                    None
                } else {
                    Some(crate::util::fs::expand_home(value.trim()))
                };
            }
            "test_command" => self.test_command = value.to_string(),
            "hash_max_attempts" => {
                let attempts: u32 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("`{}` expects a positive integer", key))?;
                if attempts == 0 {
                    bail!("`{}` expects a positive integer", key);
                }
                self.hash_max_attempts = attempts;
            }
            "hash_retry_delay_secs" => {
                let secs: u64 = value
                    .trim()
                    .parse()
                    .with_context(|| format!("`{}` expects a number of seconds", key))?;
                if secs > MAX_RETRY_DELAY_SECS {
                    bail!("`{}` must be at most {} seconds", key, MAX_RETRY_DELAY_SECS);
                }
                self.hash_retry_delay_secs = secs;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Credentials for non-interactive Hackage uploads, if both are set.
    pub fn hackage_credentials(&self) -> Option<(&str, &str)> {
        if self.hackage_username.is_empty() || self.hackage_password.is_empty() {
            None
        } else {
            Some((&self.hackage_username, &self.hackage_password))
        }
    }
}

/// Get the global relbrew config directory.
pub fn global_config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "relbrew").map(|d| d.config_dir().to_path_buf())
}

/// Get the global config path (`<config dir>/config.toml`).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Mask a secret for display, keeping only its length visible.
pub fn mask(key: &str, value: &str) -> String {
    if SECRET_KEYS.contains(&key) && !value.is_empty() {
        "*".repeat(value.len().min(8))
    } else {
        value.to_string()
    }
}
