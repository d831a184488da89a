//! Cache volume records and mounts
//!
//! Tracks the labelled volumes mlpipe creates and turns them into mount
//! arguments for exec steps.

use crate::error::MlpipeResult;
use crate::orchestration::ContainerRuntime;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Volume label keys used to track cache metadata
pub mod labels {
    /// Marks volume as an mlpipe cache
    pub const MLPIPE_CACHE: &str = "io.mlpipe.cache";
    /// Mount path the volume was created for
    pub const PATH: &str = "io.mlpipe.cache.path";
    /// Creation timestamp (RFC3339)
    pub const CREATED_AT: &str = "io.mlpipe.cache.created_at";
}

/// Information about a cache volume
#[derive(Debug, Clone, Serialize)]
pub struct CacheVolume {
    /// Volume name
    pub name: String,
    /// Mount path inside containers
    pub path: String,
    /// When the volume was created
    pub created_at: DateTime<Utc>,
}

impl CacheVolume {
    /// Create a new cache volume record
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            created_at: Utc::now(),
        }
    }

    /// Generate labels for volume creation
    pub fn labels(&self) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(labels::MLPIPE_CACHE.to_string(), "true".to_string());
        labels.insert(labels::PATH.to_string(), self.path.clone());
        labels.insert(labels::CREATED_AT.to_string(), self.created_at.to_rfc3339());
        labels
    }

    /// Try to parse from volume labels
    pub fn from_labels(name: &str, labels: &HashMap<String, String>) -> Option<Self> {
        // Must be an mlpipe cache
        if labels.get(labels::MLPIPE_CACHE).map(String::as_str) != Some("true") {
            return None;
        }

        let path = labels.get(labels::PATH).cloned().unwrap_or_default();

        let created_at = labels
            .get(labels::CREATED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(Self {
            name: name.to_string(),
            path,
            created_at,
        })
    }
}

/// Cache mount specification for container creation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheMount {
    /// Volume name
    pub volume_name: String,
    /// Mount path inside container
    pub container_path: String,
}

impl CacheMount {
    /// Generate the volume mount string for the engine CLI
    pub fn volume_arg(&self) -> String {
        format!("{}:{}", self.volume_name, self.container_path)
    }
}

/// Create the labelled volume behind `mount` unless it already exists
pub async fn ensure_volume(runtime: &dyn ContainerRuntime, mount: &CacheMount) -> MlpipeResult<()> {
    if runtime.volume_exists(&mount.volume_name).await? {
        return Ok(());
    }

    debug!("Creating cache volume {}", mount.volume_name);
    let volume = CacheVolume::new(&mount.volume_name, &mount.container_path);
    runtime.volume_create(&volume.name, &volume.labels()).await
}
