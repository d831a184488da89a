//! Error types for mlpipe
//!
//! All modules use `MlpipeResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for mlpipe operations
pub type MlpipeResult<T> = Result<T, MlpipeError>;

/// All errors that can occur in mlpipe
#[derive(Error, Debug)]
pub enum MlpipeError {
    // Engine errors
    #[error("No container engine found. Install podman (preferred) or docker")]
    EngineNotFound,

    #[error("Container engine {program} is not usable: {reason}")]
    EngineNotReady { program: String, reason: String },

    #[error("Unknown container engine: {0}. Expected auto, podman or docker")]
    UnknownEngine(String),

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Image build failed: {tag}\n{reason}")]
    ImageBuild { tag: String, reason: String },

    #[error("Failed to commit container {container} to {tag}: {reason}")]
    Commit {
        container: String,
        tag: String,
        reason: String,
    },

    #[error("Failed to copy {path} out of container: {reason}")]
    CopyOut { path: String, reason: String },

    // Pipeline errors
    #[error("Step failed: {command} (exit code {code})\n{output}")]
    StepFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("Container has no exec step to read output from")]
    NoExecStep,

    #[error("Pipeline cancelled")]
    Cancelled,

    // Cache errors
    #[error("Failed to create cache volume {name}: {reason}")]
    CacheVolumeCreate { name: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl MlpipeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a step failure from the argv that was executed
    pub fn step_failed(argv: &[String], code: i32, output: impl Into<String>) -> Self {
        Self::StepFailed {
            command: argv.join(" "),
            code,
            output: output.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineNotFound => Some("Install podman: https://podman.io/docs/installation"),
            Self::EngineNotReady { .. } => Some("Check the engine with: podman info"),
            Self::UnknownEngine(_) => Some("Run: mlpipe config show"),
            Self::ImagePull { .. } => Some("Check network access to the image registry"),
            Self::Cancelled => Some("Layers that finished are cached and reused on the next run"),
            Self::ConfigInvalid { .. } => Some("Run: mlpipe config init --force"),
            _ => None,
        }
    }
}
