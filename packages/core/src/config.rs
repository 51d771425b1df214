//! Application configuration
//!
//! Loaded from a JSON file. Every field carries a serde default, so older or
//! partial files deserialize without error. A missing file is created with
//! the defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const DEFAULT_CONFIG_PATH: &str = "./data/config.json";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "MINDNOSCAPE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Only "sqlite" is supported
    pub database_type: String,
    pub database_dir: PathBuf,
    pub database_file: String,

    pub log_folder: PathBuf,
    pub command_log: String,
    pub error_log: String,
    pub info_log: String,

    /// Account created at startup when missing
    pub default_user: String,
    pub default_user_active: bool,
    pub default_user_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_type: "sqlite".to_string(),
            database_dir: PathBuf::from("./data"),
            database_file: "mindnoscape.db".to_string(),
            log_folder: PathBuf::from("./logs"),
            command_log: "commands.log".to_string(),
            error_log: "errors.log".to_string(),
            info_log: "info.log".to_string(),
            default_user: "a".to_string(),
            default_user_active: true,
            default_user_password: String::new(),
        }
    }
}

impl Config {
    /// Config file location, honouring [`CONFIG_PATH_ENV`]
    pub fn default_path() -> PathBuf {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_dir.join(&self.database_file)
    }

    pub fn command_log_path(&self) -> PathBuf {
        self.log_folder.join(&self.command_log)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.log_folder.join(&self.error_log)
    }

    pub fn info_log_path(&self) -> PathBuf {
        self.log_folder.join(&self.info_log)
    }

    /// Load `path`, writing the defaults there first when it does not exist
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save(path).await?;
            tracing::info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write to a temp file next to `path`, then rename over it
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(write_err)?;
        }

        let serialized = serde_json::to_string_pretty(self)?;
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        fs::write(&temp, serialized).await.map_err(write_err)?;
        fs::rename(&temp, path).await.map_err(write_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let config = Config::load_or_create(&path).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"default_user": "root", "database_file": "x.db"}"#)
            .await
            .unwrap();

        let config = Config::load_or_create(&path).await.unwrap();
        assert_eq!(config.default_user, "root");
        assert_eq!(config.database_path(), PathBuf::from("./data").join("x.db"));
        assert_eq!(config.database_type, "sqlite");
        assert!(config.default_user_active);
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = Config::load_or_create(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
