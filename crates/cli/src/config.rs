use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use common::edit::{RowCountPolicy, TreeSettings, DEFAULT_BATCH_ROWS};

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "stagetree.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings read from `stagetree.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rows written per store call during commit
    pub batch_rows: usize,
    pub row_count_policy: RowCountPolicy,
    /// Legal suffixes of store file names
    pub file_suffixes: Vec<String>,
    /// Store snapshot used when a command is not given one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_store: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = TreeSettings::default();
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
            row_count_policy: settings.row_count_policy,
            file_suffixes: settings.file_suffixes,
            default_store: None,
        }
    }
}

impl Config {
    /// Platform config location, e.g. `~/.config/stagetree/stagetree.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "stagetree")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load the config at `path`, or at the default location
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config =
            toml::from_str(&data).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        config.check()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, data).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.batch_rows == 0 {
            return Err(ConfigError::Invalid("batch_rows must be at least 1".into()));
        }
        if self.file_suffixes.iter().any(|s| !s.starts_with('.')) {
            return Err(ConfigError::Invalid(
                "file_suffixes must start with a dot".into(),
            ));
        }
        Ok(())
    }

    /// Tree settings derived from this config
    pub fn tree_settings(&self) -> TreeSettings {
        TreeSettings {
            row_count_policy: self.row_count_policy,
            file_suffixes: self.file_suffixes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "row_count_policy = \"pad\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.row_count_policy, RowCountPolicy::Pad);
        assert_eq!(config.batch_rows, DEFAULT_BATCH_ROWS);
        assert_eq!(config.file_suffixes, TreeSettings::default().file_suffixes);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "batch_rows = 0\n").unwrap();
        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }
}
