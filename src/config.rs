//! Configuration management for the RAX file repository
//!
//! Values come from built-in defaults, then an optional `config.toml`, then
//! `RAX_REPO_*` environment variables. Everything here is read once at
//! startup; changing it requires a restart.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::transfer::archive::{ArchiveOptions, DEFAULT_BUFFER_SIZE, DEFAULT_COMPRESSION_LEVEL};

/// Default configuration file, looked up relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config";

/// Prefix for environment overrides, e.g. `RAX_REPO_STORAGE_ROOT`.
pub const ENV_PREFIX: &str = "RAX_REPO";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Directory served to clients (created on startup if missing)
    pub storage_root: String,

    /// Deflate level for generated archives; 0 stores entries uncompressed
    pub compression_level: u32,

    /// Capacity of the async archive pipe and file read buffer
    pub stream_buffer_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            storage_root: "./storage".to_string(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            stream_buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl RepositoryConfig {
    /// Load configuration with environment overrides.
    ///
    /// An explicit `path` must exist; the default `config.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("storage_root", defaults.storage_root)?
            .set_default("compression_level", i64::from(defaults.compression_level))?
            .set_default("stream_buffer_size", defaults.stream_buffer_size as i64)?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let config: RepositoryConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_root.trim().is_empty() {
            return Err(ConfigError::Message("storage_root cannot be empty".into()));
        }

        if self.compression_level > 9 {
            return Err(ConfigError::Message(format!(
                "compression_level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }

        if self.stream_buffer_size == 0 {
            return Err(ConfigError::Message(
                "stream_buffer_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get storage root as PathBuf
    pub fn storage_root_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_root)
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            compression_level: self.compression_level,
            buffer_size: self.stream_buffer_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = RepositoryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.archive_options(), ArchiveOptions::default());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repo.toml");
        fs::write(
            &path,
            "storage_root = \"/srv/files\"\ncompression_level = 0\nstream_buffer_size = 4096\n",
        )
        .unwrap();

        let config = RepositoryConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage_root_path(), PathBuf::from("/srv/files"));
        assert_eq!(config.compression_level, 0);
        assert_eq!(config.stream_buffer_size, 4096);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repo.toml");
        fs::write(&path, "storage_root = \"data\"\n").unwrap();

        let config = RepositoryConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage_root, "data");
        assert_eq!(config.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(config.stream_buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = RepositoryConfig::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = RepositoryConfig::default();
        config.compression_level = 12;
        assert!(config.validate().is_err());

        let mut config = RepositoryConfig::default();
        config.storage_root = "  ".into();
        assert!(config.validate().is_err());

        let mut config = RepositoryConfig::default();
        config.stream_buffer_size = 0;
        assert!(config.validate().is_err());
    }
}
