//! # imagepile-config
//!
//! Configuration for the imagepile tools.
//!
//! Resolution order for the pile directory (the directory holding the
//! block pool and the hash index under their fixed names):
//!
//! 1. `~/.imagepile/config.toml` (optional, `[storage] pile_dir = "..."`)
//! 2. `IMGDIR` environment variable (highest priority)
//!
//! There is no default location: a run with neither configured fails
//! before any I/O is attempted.

pub mod logging;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable naming the pile directory.
pub const IMGDIR_ENV: &str = "IMGDIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("pile directory not configured: set {IMGDIR_ENV} or [storage] pile_dir")]
    PileDirUnset,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `imagepile.db` and `imagepile.hash_index`.
    pub pile_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the global config file, then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                tracing::debug!("loading config from {:?}", path);
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            }
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Global config path: `~/.imagepile/config.toml`.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".imagepile/config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(IMGDIR_ENV) {
            self.storage.pile_dir = Some(PathBuf::from(dir));
        }
    }

    /// The resolved pile directory, or an environment error if unset.
    pub fn pile_dir(&self) -> Result<&Path> {
        self.storage
            .pile_dir
            .as_deref()
            .ok_or(ConfigError::PileDirUnset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serializes tests that touch process-wide environment variables.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn env_var_overrides_file_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        let mut config: Config = toml::from_str(
            r#"
[storage]
pile_dir = "/from/file"
"#,
        )
        .unwrap();

        std::env::set_var(IMGDIR_ENV, "/from/env");
        config.apply_env_overrides();
        std::env::remove_var(IMGDIR_ENV);

        assert_eq!(config.pile_dir().unwrap(), Path::new("/from/env"));
    }

    #[test]
    fn unset_pile_dir_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var(IMGDIR_ENV);

        let config = Config::default();
        assert!(matches!(config.pile_dir(), Err(ConfigError::PileDirUnset)));
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.storage.pile_dir.is_none());
    }

    #[test]
    fn file_value_is_used_without_env() {
        let config: Config = toml::from_str(
            r#"
[storage]
pile_dir = "/var/imagepile"
"#,
        )
        .unwrap();
        assert_eq!(config.pile_dir().unwrap(), Path::new("/var/imagepile"));
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result: std::result::Result<Config, _> = toml::from_str("storage = [");
        assert!(result.is_err());
    }

    #[test]
    fn global_config_path_is_under_home() {
        let path = Config::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().ends_with(".imagepile/config.toml"));
    }
}
