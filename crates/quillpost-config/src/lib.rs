use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

fn default_undo_depth() -> usize {
    100
}

fn default_undo_grouping_ms() -> u64 {
    5000
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Capacity of the undo/redo stacks.
    #[serde(default = "default_undo_depth")]
    pub undo_depth: usize,
    /// Edits sharing an action within this window undo as one step.
    #[serde(default = "default_undo_grouping_ms")]
    pub undo_grouping_ms: u64,
    /// Directory documents are loaded from and saved to.
    pub documents_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            undo_depth: default_undo_depth(),
            undo_grouping_ms: default_undo_grouping_ms(),
            documents_path: None,
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Expand shell variables and tilde in the configured path
        config.documents_path = config
            .documents_path
            .map(|path| Self::expand_path(&path).unwrap_or(path));

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/quillpost");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_path() {
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        // Should not contain tilde anymore
        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/quillpost/config.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.undo_depth, 100);
        assert_eq!(config.undo_grouping_ms, 5000);
        assert!(config.documents_path.is_none());
    }

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let result = Config::load_from_path(dir.path().join("missing.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "undo_depth = 25\n").unwrap();

        let config = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(config.undo_depth, 25);
        assert_eq!(config.undo_grouping_ms, 5000, "missing keys use defaults");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config {
            undo_depth: 7,
            undo_grouping_ms: 1234,
            documents_path: Some(PathBuf::from("/tmp/docs")),
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap().unwrap();
        assert_eq!(loaded.undo_depth, 7);
        assert_eq!(loaded.undo_grouping_ms, 1234);
        assert_eq!(loaded.documents_path, Some(PathBuf::from("/tmp/docs")));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "undo_depth = \"not a number\"").unwrap();

        let result = Config::load_from_path(&path);
        assert!(matches!(result, Err(ConfigError::ConfigParseError { .. })));
    }

    #[test]
    fn test_tilde_in_documents_path_is_expanded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "documents_path = \"~/docs\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap().unwrap();
        let documents_path = config.documents_path.unwrap();
        assert!(!documents_path.to_string_lossy().starts_with('~'));
    }
}
