//! Runtime factory for creating the configured container runtime
//!
//! Provides engine detection and runtime instantiation.

use crate::config::Config;
use crate::error::{MlpipeError, MlpipeResult};
use crate::orchestration::cli_runtime::{CliRuntime, EngineKind};
use crate::orchestration::runtime::ContainerRuntime;
use tracing::debug;

/// Parse the `engine.program` setting. `None` means auto-detect.
pub(crate) fn parse_engine(program: &str) -> MlpipeResult<Option<EngineKind>> {
    match program.trim().to_ascii_lowercase().as_str() {
        "" | "auto" => Ok(None),
        "podman" => Ok(Some(EngineKind::Podman)),
        "docker" => Ok(Some(EngineKind::Docker)),
        other => Err(MlpipeError::UnknownEngine(other.to_string())),
    }
}

/// Create a container runtime for the configured engine
///
/// # Arguments
/// * `config` - The application configuration
///
/// # Returns
/// * `Ok(Box<dyn ContainerRuntime>)` - A boxed runtime implementation
/// * `Err` - If the engine name is unknown, or auto-detection finds nothing
pub async fn create_runtime(config: &Config) -> MlpipeResult<Box<dyn ContainerRuntime>> {
    if let Some(kind) = parse_engine(&config.engine.program)? {
        return Ok(Box::new(CliRuntime::new(kind)));
    }

    for kind in EngineKind::all() {
        if CliRuntime::installed(*kind).await {
            debug!("Detected container engine: {}", kind.program());
            return Ok(Box::new(CliRuntime::new(*kind)));
        }
    }

    Err(MlpipeError::EngineNotFound)
}
