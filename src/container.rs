//! Immutable container handles
//!
//! A [`Container`] is a base image plus an ordered list of layers. Builder
//! methods never mutate the receiver; each returns a new handle, so a handle
//! can be extended in several directions without the branches interfering.
//!
//! Nothing touches the engine until a handle is evaluated with
//! [`Container::sync`], [`Container::stdout`] or [`FileRef::export`]. Evaluation
//! walks the layers in order. Every layer has a content address derived from
//! its parent's address and its own inputs, and is committed under the tag
//! `mlpipe-layer-<hash>`. When layer reuse is enabled, a layer whose tag is
//! already present is skipped. The first failing layer aborts the walk, so
//! later layers never run.

use crate::cache::{ensure_volume, CacheMount};
use crate::context::ExecContext;
use crate::error::{MlpipeError, MlpipeResult};
use crate::orchestration::{error_tail, ContainerRuntime, RunOutput, RunSpec};
use crate::source::Directory;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tag prefix of every materialized layer
pub const LAYER_PREFIX: &str = "mlpipe-layer-";

/// One exec step, with the handle state captured when it was appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStep {
    /// Command and arguments
    pub argv: Vec<String>,
    /// Working directory
    pub workdir: String,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Cache volumes mounted while the step runs
    pub mounts: Vec<CacheMount>,
}

impl ExecStep {
    /// Human-readable command line
    pub fn label(&self) -> String {
        self.argv.join(" ")
    }
}

#[derive(Debug, Clone)]
enum Layer {
    Directory { dest: String, source: Directory },
    Exec(ExecStep),
}

impl Layer {
    fn label(&self) -> String {
        match self {
            Layer::Directory { dest, source } => {
                format!("copy {} -> {}", source.root().display(), dest)
            }
            Layer::Exec(step) => step.label(),
        }
    }

    fn digest(&self) -> MlpipeResult<Vec<u8>> {
        let mut hasher = Sha256::new();
        match self {
            Layer::Directory { dest, source } => {
                hasher.update(b"directory\0");
                hasher.update(dest.as_bytes());
                hasher.update(b"\0");
                hasher.update(source.digest()?.as_bytes());
            }
            Layer::Exec(step) => {
                hasher.update(b"exec\0");
                for arg in &step.argv {
                    hasher.update(arg.as_bytes());
                    hasher.update(b"\0");
                }
                hasher.update(step.workdir.as_bytes());
                for (k, v) in &step.env {
                    hasher.update(format!("\0{}={}", k, v).as_bytes());
                }
                for mount in &step.mounts {
                    hasher.update(format!("\0{}", mount.volume_arg()).as_bytes());
                }
            }
        }
        Ok(hasher.finalize().to_vec())
    }
}

/// Receives progress while a handle is evaluated
pub trait StepObserver: Send + Sync {
    /// A layer is about to run
    fn step_started(&self, _index: usize, _total: usize, _label: &str) {}

    /// A layer was found already materialized
    fn step_cached(&self, _index: usize, _total: usize, _label: &str) {}

    /// A line of output from the running layer
    fn output_line(&self, _line: String) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {}

/// Evaluates container handles against a runtime
pub struct Executor<'a> {
    runtime: &'a dyn ContainerRuntime,
    builds_dir: PathBuf,
    reuse_layers: bool,
    observer: &'a dyn StepObserver,
}

impl<'a> Executor<'a> {
    /// Create an executor that stages build contexts under `builds_dir`
    pub fn new(runtime: &'a dyn ContainerRuntime, builds_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            builds_dir: builds_dir.into(),
            reuse_layers: true,
            observer: &NoopObserver,
        }
    }

    /// Enable or disable reuse of already materialized layers
    pub fn reuse_layers(mut self, reuse: bool) -> Self {
        self.reuse_layers = reuse;
        self
    }

    /// Report progress to `observer`
    pub fn with_observer(mut self, observer: &'a dyn StepObserver) -> Self {
        self.observer = observer;
        self
    }

    async fn ensure_base(&self, image: &str, ctx: &ExecContext) -> MlpipeResult<()> {
        if !self.runtime.image_exists(image).await? {
            let observer = self.observer;
            let sink = move |line: String| observer.output_line(line);
            self.runtime.pull(image, ctx, &sink).await?;
        }
        Ok(())
    }

    /// Run one exec step on top of `image`.
    ///
    /// On success the stopped container is left for the caller to commit or
    /// remove. On a non-zero exit it is removed and the step error returned.
    async fn run_exec(
        &self,
        step: &ExecStep,
        image: &str,
        ctx: &ExecContext,
    ) -> MlpipeResult<RunOutput> {
        for mount in &step.mounts {
            ensure_volume(self.runtime, mount).await?;
        }

        let spec = RunSpec {
            name: format!("mlpipe-step-{}", uuid::Uuid::new_v4().simple()),
            image: image.to_string(),
            workdir: step.workdir.clone(),
            volumes: step.mounts.iter().map(CacheMount::volume_arg).collect(),
            env: step.env.clone(),
            command: step.argv.clone(),
        };

        let observer = self.observer;
        let sink = move |line: String| observer.output_line(line);
        let output = self.runtime.run(&spec, ctx, &sink).await?;

        if !output.success() {
            let _ = self.runtime.remove(&output.container).await;
            return Err(MlpipeError::step_failed(
                &step.argv,
                output.exit_code,
                error_tail(&output.stdout, &output.stderr),
            ));
        }

        Ok(output)
    }

    /// Stage `source` into a fresh build context and build `FROM parent`
    async fn build_directory(
        &self,
        parent: &str,
        dest: &str,
        source: &Directory,
        tag: &str,
        ctx: &ExecContext,
    ) -> MlpipeResult<()> {
        let build_dir = self
            .builds_dir
            .join(uuid::Uuid::new_v4().simple().to_string());

        let result: MlpipeResult<()> = async {
            source.stage(&build_dir.join("src"))?;

            let containerfile = format!("FROM {}\nCOPY src/ {}/\n", parent, dest.trim_end_matches('/'));
            tokio::fs::write(build_dir.join("Containerfile"), containerfile)
                .await
                .map_err(|e| MlpipeError::io("writing Containerfile", e))?;

            let observer = self.observer;
            let sink = move |line: String| observer.output_line(line);
            self.runtime.build_image(&build_dir, tag, ctx, &sink).await
        }
        .await;

        // Clean up build directory (best-effort)
        let _ = tokio::fs::remove_dir_all(&build_dir).await;

        result
    }
}

/// An immutable container handle
#[derive(Debug, Clone)]
pub struct Container {
    from: String,
    layers: Vec<Layer>,
    workdir: String,
    env: BTreeMap<String, String>,
    mounts: Vec<CacheMount>,
}

impl Container {
    /// Start a handle from a base image
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            from: image.into(),
            layers: Vec::new(),
            workdir: "/".to_string(),
            env: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }

    fn push(&self, layer: Layer) -> Self {
        let mut next = self.clone();
        next.layers.push(layer);
        next
    }

    /// Copy the filtered `source` tree to `dest` inside the image
    pub fn with_directory(&self, dest: impl Into<String>, source: &Directory) -> Self {
        self.push(Layer::Directory {
            dest: dest.into(),
            source: source.clone(),
        })
    }

    /// Set the working directory for subsequent exec steps
    pub fn with_workdir(&self, workdir: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.workdir = workdir.into();
        next
    }

    /// Set an environment variable for subsequent exec steps
    pub fn with_env_variable(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.env.insert(key.into(), value.into());
        next
    }

    /// Mount a named cache volume at `path` for subsequent exec steps
    pub fn with_mounted_cache(&self, path: impl Into<String>, volume: impl Into<String>) -> Self {
        let path = path.into();
        let mut next = self.clone();
        next.mounts.retain(|m| m.container_path != path);
        next.mounts.push(CacheMount {
            volume_name: volume.into(),
            container_path: path,
        });
        next
    }

    /// Append an exec step
    pub fn with_exec<S: AsRef<str>>(&self, argv: &[S]) -> Self {
        self.push(Layer::Exec(ExecStep {
            argv: argv.iter().map(|a| a.as_ref().to_string()).collect(),
            workdir: self.workdir.clone(),
            env: self.env.clone(),
            mounts: self.mounts.clone(),
        }))
    }

    /// Reference a file inside this container
    pub fn file(&self, path: impl Into<String>) -> FileRef {
        FileRef {
            container: self.clone(),
            path: path.into(),
        }
    }

    /// The base image
    pub fn base_image(&self) -> &str {
        &self.from
    }

    /// Current working directory
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Exec steps in the order they will run
    pub fn exec_steps(&self) -> impl Iterator<Item = &ExecStep> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Exec(step) => Some(step),
            Layer::Directory { .. } => None,
        })
    }

    /// Number of layers on top of the base image
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Content-addressed tags for the first `upto` layers
    fn layer_tags(&self, upto: usize) -> MlpipeResult<Vec<String>> {
        let mut address = Sha256::digest(format!("from\0{}", self.from).as_bytes()).to_vec();
        let mut tags = Vec::with_capacity(upto);

        for layer in &self.layers[..upto] {
            let mut hasher = Sha256::new();
            hasher.update(&address);
            hasher.update(layer.digest()?);
            address = hasher.finalize().to_vec();
            tags.push(format!("{}{}", LAYER_PREFIX, &hex::encode(&address)[..12]));
        }

        Ok(tags)
    }

    /// Materialize the first `upto` layers and return the resulting image
    async fn materialize(
        &self,
        exec: &Executor<'_>,
        ctx: &ExecContext,
        upto: usize,
    ) -> MlpipeResult<String> {
        exec.ensure_base(&self.from, ctx).await?;

        let tags = self.layer_tags(upto)?;
        let total = self.layers.len();
        let mut current = self.from.clone();

        for (index, (layer, tag)) in self.layers[..upto].iter().zip(tags).enumerate() {
            if ctx.is_cancelled() {
                return Err(MlpipeError::Cancelled);
            }

            let label = layer.label();

            if exec.reuse_layers && exec.runtime.image_exists(&tag).await? {
                debug!("Layer {} cached as {}", label, tag);
                exec.observer.step_cached(index + 1, total, &label);
                current = tag;
                continue;
            }

            info!("Step {}/{}: {}", index + 1, total, label);
            exec.observer.step_started(index + 1, total, &label);

            match layer {
                Layer::Directory { dest, source } => {
                    exec.build_directory(&current, dest, source, &tag, ctx)
                        .await?;
                }
                Layer::Exec(step) => {
                    let output = exec.run_exec(step, &current, ctx).await?;
                    let committed = exec.runtime.commit(&output.container, &tag).await;
                    exec.runtime.remove(&output.container).await?;
                    committed?;
                }
            }

            current = tag;
        }

        Ok(current)
    }

    /// Evaluate every layer and return the resulting image tag
    pub async fn sync(&self, exec: &Executor<'_>, ctx: &ExecContext) -> MlpipeResult<String> {
        self.materialize(exec, ctx, self.layers.len()).await
    }

    /// Evaluate the handle and return the standard output of its last exec.
    ///
    /// The final exec always runs, even when an identical layer is cached, so
    /// its output is fresh. Its container is discarded afterwards.
    pub async fn stdout(&self, exec: &Executor<'_>, ctx: &ExecContext) -> MlpipeResult<String> {
        let Some(Layer::Exec(step)) = self.layers.last() else {
            return Err(MlpipeError::NoExecStep);
        };

        let parent = self.materialize(exec, ctx, self.layers.len() - 1).await?;

        let total = self.layers.len();
        info!("Step {}/{}: {}", total, total, step.label());
        exec.observer.step_started(total, total, &step.label());

        let output = exec.run_exec(step, &parent, ctx).await?;
        exec.runtime.remove(&output.container).await?;

        Ok(output.stdout)
    }
}

/// A lazy reference to a file inside a container handle
#[derive(Debug, Clone)]
pub struct FileRef {
    container: Container,
    path: String,
}

impl FileRef {
    /// Path inside the container, resolved against its working directory
    pub fn path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("{}/{}", self.container.workdir.trim_end_matches('/'), self.path)
        }
    }

    /// The handle the file lives in
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Evaluate the container and copy the file to `dest` on the host
    pub async fn export(
        &self,
        exec: &Executor<'_>,
        ctx: &ExecContext,
        dest: &Path,
    ) -> MlpipeResult<PathBuf> {
        let image = self.container.sync(exec, ctx).await?;
        if ctx.is_cancelled() {
            return Err(MlpipeError::Cancelled);
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MlpipeError::io(format!("creating {}", parent.display()), e))?;
        }

        let id = exec.runtime.create(&image).await?;
        let copied = exec.runtime.copy_out(&id, &self.path(), dest).await;
        exec.runtime.remove(&id).await?;
        copied?;

        info!("Exported {} to {}", self.path(), dest.display());
        Ok(dest.to_path_buf())
    }
}
