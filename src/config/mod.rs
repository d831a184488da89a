//! Configuration management for mlpipe

pub mod schema;

pub use schema::Config;

use crate::error::{MlpipeError, MlpipeResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the project-local config file
pub const LOCAL_CONFIG_FILE: &str = ".mlpipe.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mlpipe")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mlpipe")
    }

    /// Directory holding temporary build contexts
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Walk up from `start` looking for a project-local config file
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load the global configuration overlaid with an optional local file.
    ///
    /// Tables are merged key by key, so a local file only needs to name the
    /// settings it changes.
    pub async fn load_merged(&self, local: Option<&Path>) -> MlpipeResult<Config> {
        let mut merged = toml::Table::new();

        if self.config_path.exists() {
            merged = Self::read_table(&self.config_path).await?;
        } else {
            debug!("Config file not found, using defaults");
        }

        if let Some(path) = local {
            let overlay = Self::read_table(path).await?;
            merge_tables(&mut merged, overlay);
        }

        let origin = local.unwrap_or(&self.config_path);
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| MlpipeError::ConfigInvalid {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn read_table(path: &Path) -> MlpipeResult<toml::Table> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| MlpipeError::io(format!("reading config from {}", path.display()), e))?;

        content
            .parse::<toml::Table>()
            .map_err(|e| MlpipeError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> MlpipeResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            MlpipeError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> MlpipeResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MlpipeError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> MlpipeResult<()> {
        for dir in [Self::state_dir(), Self::builds_dir()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                MlpipeError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursively overlay `overlay` onto `base`. Non-table values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
