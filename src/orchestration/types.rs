//! Engine-neutral request and response types

use std::collections::{BTreeMap, HashMap};

/// Everything needed to run one step in a fresh container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Container name, also used to commit and remove it afterwards
    pub name: String,
    /// Image the container starts from
    pub image: String,
    /// Working directory inside the container
    pub workdir: String,
    /// Volume mounts (volume:path format)
    pub volumes: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Command and arguments
    pub command: Vec<String>,
}

impl RunSpec {
    /// Arguments following `<engine> run`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--name".to_string(), self.name.clone()];

        args.push("-w".to_string());
        args.push(self.workdir.clone());

        for v in &self.volumes {
            args.push("-v".to_string());
            args.push(v.clone());
        }

        for (k, v) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Result of a finished container run
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Name of the (stopped, not yet removed) container
    pub container: String,
    /// Process exit code, -1 when killed by a signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl RunOutput {
    /// Whether the step exited cleanly
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Information about an engine volume
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    /// Volume name
    pub name: String,
    /// Labels attached at creation
    pub labels: HashMap<String, String>,
    /// Host mountpoint, if reported
    pub mountpoint: Option<String>,
    /// Creation timestamp as reported by the engine
    pub created_at: Option<String>,
}
