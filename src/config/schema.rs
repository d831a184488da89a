//! Configuration schema for mlpipe
//!
//! Global configuration is stored at `~/.config/mlpipe/config.toml` and can be
//! overridden per project by a `.mlpipe.toml` file. Every default reproduces
//! the stock pipeline, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container engine settings
    pub engine: EngineConfig,

    /// Base image settings
    pub image: ImageConfig,

    /// Source copy settings
    pub source: SourceConfig,

    /// Dependency cache settings
    pub cache: CacheConfig,

    /// Raw dataset fetch settings
    pub dataset: DatasetConfig,

    /// Project scripts invoked by each stage
    pub scripts: ScriptsConfig,

    /// Model registry settings
    pub registry: RegistryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine CLI to drive: "auto", "podman" or "docker"
    pub program: String,

    /// Reuse previously materialized layers with the same content address
    pub reuse_layers: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "auto".to_string(),
            reuse_layers: true,
        }
    }
}

/// Base image settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Image every pipeline starts from
    pub base: String,

    /// Directory the project source is copied to, and the working directory
    pub workdir: String,

    /// Environment variables set for every exec step
    pub env: BTreeMap<String, String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base: "python:3.12.2-bookworm".to_string(),
            workdir: "/app".to_string(),
            env: BTreeMap::new(),
        }
    }
}

/// Source copy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Paths excluded when copying the project into the image
    pub exclude: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            exclude: [
                ".dagger/",
                ".git",
                ".gitignore",
                ".github",
                ".dvc",
                "LICENSE",
                "dagger.json",
                "notebooks/",
                "models/",
                ".ruff_cache/",
                ".pytest_cache/",
                "data/processed/*",
                "data/interim/*",
                "mlruns/",
                "**/__pycache__",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Dependency cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Mount the dependency cache volume (default: true)
    pub enabled: bool,

    /// Volume name
    pub volume: String,

    /// Mount path inside the container
    pub path: String,

    /// Dependency manifest installed by the installer
    pub requirements: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: "mlpipe-cache-pip".to_string(),
            path: "/root/.cache/pip".to_string(),
            requirements: "requirements.txt".to_string(),
        }
    }
}

/// Raw dataset fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Fetch the raw dataset while building the environment
    pub enabled: bool,

    /// Package providing the data-versioning CLI
    pub tool: String,

    /// Repository holding the versioned dataset
    pub repo_url: String,

    /// File to fetch from the repository
    pub file: String,

    /// Destination path inside the working directory
    pub output: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tool: "dvc".to_string(),
            repo_url: "https://github.com/Jeppe-T-K/itu-sdse-project-data".to_string(),
            file: "raw_data.csv".to_string(),
            output: "data/raw/raw_data.csv".to_string(),
        }
    }
}

/// Project scripts invoked by each stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptsConfig {
    /// Interpreter used for every script
    pub interpreter: String,

    /// Dataset construction script
    pub dataset: String,

    /// Subcommand passed to the dataset script
    pub dataset_command: String,

    /// Feature engineering script
    pub features: String,

    /// Training script
    pub train: String,

    /// Algorithms trained, in order
    pub algorithms: Vec<String>,

    /// Model selection script
    pub selection: String,

    /// Directory listed after dataset creation
    pub interim_dir: String,

    /// Test runner command
    pub test_runner: Vec<String>,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            dataset: "itu_sdse_project/dataset.py".to_string(),
            dataset_command: "create-training-data".to_string(),
            features: "itu_sdse_project/features.py".to_string(),
            train: "itu_sdse_project/modeling/train.py".to_string(),
            algorithms: vec!["xgboost".to_string(), "log-reg".to_string()],
            selection: "itu_sdse_project/modeling/selection.py".to_string(),
            interim_dir: "data/interim".to_string(),
            test_runner: vec!["pytest".to_string()],
        }
    }
}

/// Model registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry CLI
    pub cli: String,

    /// Registered model name
    pub model_name: String,

    /// Alias pointing at the version under evaluation
    pub alias: String,

    /// Directory the artifact is downloaded to inside the container
    pub download_dir: String,

    /// File extracted from the downloaded artifact, relative to `download_dir`
    pub artifact_file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cli: "mlflow".to_string(),
            model_name: "lead_model".to_string(),
            alias: "staging".to_string(),
            download_dir: "/tmp/model".to_string(),
            artifact_file: "artifacts/model.pkl".to_string(),
        }
    }
}
