use super::app_config::{APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, WebImageConfig};
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform config directory.
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be serialized.
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Loads and saves [`WebImageConfig`] files.
pub struct ConfigStore {
    config_dir: PathBuf,
}

impl ConfigStore {
    /// Create a new `ConfigStore` rooted at the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration directory cannot be determined.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::ConfigDirNotFound)?;

        Ok(Self { config_dir })
    }

    /// Creates a new `ConfigStore` with a specific directory (useful for testing).
    #[must_use]
    pub fn with_dir(path: PathBuf) -> Self {
        Self { config_dir: path }
    }

    /// Returns the configuration directory path.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Loads the configuration.
    ///
    /// A missing file yields the defaults. A file that does not parse is
    /// reported and also yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read.
    pub fn load(&self, path_override: Option<&Path>) -> Result<WebImageConfig, ConfigError> {
        let config_path = path_override.map_or_else(
            || self.config_dir.join(CONFIG_FILE_NAME),
            Path::to_path_buf,
        );

        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file not found, using defaults");
            return Ok(WebImageConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str::<WebImageConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                Ok(WebImageConfig::default())
            }
        }
    }

    /// Writes `config` to the default location.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if serialization or writing fails.
    pub fn save(&self, config: &WebImageConfig) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.config_dir)?;
        Self::save_to_file(&self.config_dir.join(CONFIG_FILE_NAME), config)
    }

    fn save_to_file<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(data)?;

        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("Invalid path"))?;
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path().to_path_buf());

        let config = store.load(None).unwrap();
        assert_eq!(config.cache.namespace, "default");
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path().to_path_buf());

        let mut config = WebImageConfig::default();
        config.cache.namespace = "thumbs".to_string();
        config.downloader.max_concurrent_downloads = 3;
        store.save(&config).unwrap();

        let loaded = store.load(None).unwrap();
        assert_eq!(loaded.cache.namespace, "thumbs");
        assert_eq!(loaded.downloader.max_concurrent_downloads, 3);
    }

    #[test]
    fn test_save_replaces_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::with_dir(dir.path().join("webimage"));

        store.save(&WebImageConfig::default()).unwrap();
        let mut config = WebImageConfig::default();
        config.cache.namespace = "avatars".to_string();
        store.save(&config).unwrap();

        let names: Vec<_> = fs::read_dir(store.config_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(CONFIG_FILE_NAME)]);
        assert_eq!(store.load(None).unwrap().cache.namespace, "avatars");
    }

    #[test]
    fn test_invalid_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "cache = [not toml").unwrap();

        let store = ConfigStore::with_dir(dir.path().to_path_buf());
        let config = store.load(Some(&path)).unwrap();
        assert_eq!(config.downloader.max_concurrent_downloads, 6);
    }
}
