//! Container runtime abstraction
//!
//! Provides a trait for the container operations the pipeline needs, so the
//! same step chain can be driven by Podman, Docker, or a test double.

use crate::context::ExecContext;
use crate::error::MlpipeResult;
use crate::orchestration::types::{RunOutput, RunSpec, VolumeInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Callback receiving each line of streamed process output
pub type OutputSink<'a> = &'a (dyn Fn(String) + Send + Sync);

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ensure the runtime is ready to run containers
    async fn ensure_ready(&self) -> MlpipeResult<()>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> MlpipeResult<bool>;

    /// Pull an image from its registry, streaming progress
    async fn pull(
        &self,
        image: &str,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<()>;

    /// Build an image from a context directory containing a Containerfile
    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<()>;

    /// List local image references whose name starts with `prefix`
    async fn image_list_prefixed(&self, prefix: &str) -> MlpipeResult<Vec<String>>;

    /// Remove an image (missing images are not an error)
    async fn image_remove(&self, image: &str) -> MlpipeResult<()>;

    /// Run a container to completion, leaving it stopped for commit or removal.
    ///
    /// A non-zero exit is reported in [`RunOutput::exit_code`], not as an error.
    async fn run(
        &self,
        spec: &RunSpec,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<RunOutput>;

    /// Commit a stopped container's filesystem to a new image tag
    async fn commit(&self, container: &str, tag: &str) -> MlpipeResult<()>;

    /// Create (without starting) a container from an image and return its ID
    async fn create(&self, image: &str) -> MlpipeResult<String>;

    /// Copy a path out of a container onto the host
    async fn copy_out(&self, container: &str, path: &str, dest: &Path) -> MlpipeResult<()>;

    /// Remove a container (missing containers are not an error)
    async fn remove(&self, container: &str) -> MlpipeResult<()>;

    /// Create a volume with labels
    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>)
        -> MlpipeResult<()>;

    /// Check if a volume exists
    async fn volume_exists(&self, name: &str) -> MlpipeResult<bool>;

    /// List volumes whose name starts with `prefix`
    async fn volume_list(&self, prefix: &str) -> MlpipeResult<Vec<VolumeInfo>>;

    /// Remove a volume (missing volumes are not an error)
    async fn volume_remove(&self, name: &str) -> MlpipeResult<()>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
