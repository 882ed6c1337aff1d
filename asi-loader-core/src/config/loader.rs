//! Configuration loader

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// File looked up next to the host executable
pub const CONFIG_FILE_NAME: &str = "asi-loader.toml";

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "ASI_LOADER_CONFIG";

/// Configuration loader for various formats
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<LoaderConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config = match ext {
            "json" => Self::from_json(&content)?,
            "toml" | "" => Self::from_toml(&content)?,
            _ => return Err(Error::Config(format!("Unknown config format: {}", ext))),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse JSON configuration
    pub fn from_json(content: &str) -> Result<LoaderConfig> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Parse TOML configuration
    pub fn from_toml(content: &str) -> Result<LoaderConfig> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Find and load the configuration for a host living in `host_dir`.
    ///
    /// `ASI_LOADER_CONFIG` wins over `<host_dir>/asi-loader.toml`; with neither
    /// present the defaults are used.
    pub fn locate(host_dir: &Path) -> Result<LoaderConfig> {
        match Self::config_path(host_dir) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading loader config");
                Self::load(path)
            }
            None => {
                tracing::debug!("No loader config found, using defaults");
                Ok(LoaderConfig::default())
            }
        }
    }

    fn config_path(host_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let path = host_dir.join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }
}
