//! Container runtime backed by an engine CLI
//!
//! Implements the ContainerRuntime trait by executing `podman` or `docker`
//! directly. Only subcommands and flags both engines accept are used.

use crate::context::ExecContext;
use crate::error::{MlpipeError, MlpipeResult};
use crate::orchestration::runtime::{ContainerRuntime, OutputSink};
use crate::orchestration::types::{RunOutput, RunSpec, VolumeInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Supported engine CLIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Rootless Podman
    Podman,
    /// Docker
    Docker,
}

impl EngineKind {
    /// Executable name
    pub fn program(&self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// All engines in detection priority order
    pub fn all() -> &'static [Self] {
        &[Self::Podman, Self::Docker]
    }
}

/// Container runtime that shells out to an engine CLI
pub struct CliRuntime {
    kind: EngineKind,
    program: String,
}

impl CliRuntime {
    /// Create a runtime driving the given engine
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            program: kind.program().to_string(),
        }
    }

    /// Drive `program` with `kind`'s command set
    #[cfg(test)]
    fn with_program(kind: EngineKind, program: impl Into<String>) -> Self {
        Self {
            kind,
            program: program.into(),
        }
    }

    /// Check if the engine CLI is installed
    pub async fn installed(kind: EngineKind) -> bool {
        Command::new(kind.program())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> MlpipeResult<std::process::Output> {
        debug!("Executing: {}", self.describe(args));

        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MlpipeError::command_failed(self.describe(args), e))
    }

    /// Execute an engine command, failing on a non-zero exit
    async fn exec_ok(&self, args: &[&str]) -> MlpipeResult<std::process::Output> {
        let output = self.exec(args).await?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MlpipeError::command_exec(self.describe(args), stderr))
        }
    }

    /// Spawn an engine command with piped output, stream it, and wait for it.
    ///
    /// Returns the exit code and captured output. On cancellation the child is
    /// killed and `on_cancel` names a container to force-remove.
    async fn exec_streamed(
        &self,
        args: &[String],
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
        on_cancel: Option<&str>,
    ) -> MlpipeResult<(i32, super::StreamedOutput)> {
        let label = format!("{} {}", self.program, args.join(" "));
        debug!("Streaming: {}", label);

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MlpipeError::command_failed(label.clone(), e))?;

        let (stdout, stderr) = super::take_pipes(&mut child)?;

        let output = tokio::select! {
            out = super::stream_output(stdout, stderr, on_output) => out,
            _ = ctx.cancelled() => {
                warn!("Cancelling: {}", label);
                let _ = child.kill().await;
                if let Some(container) = on_cancel {
                    let _ = self.remove(container).await;
                }
                return Err(MlpipeError::Cancelled);
            }
        };

        let status = child
            .wait()
            .await
            .map_err(|e| MlpipeError::command_failed(label, e))?;

        Ok((status.code().unwrap_or(-1), output))
    }

    fn parse_volume(name: &str, vol: &serde_json::Value) -> VolumeInfo {
        let labels: HashMap<String, String> = vol["Labels"]
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        VolumeInfo {
            name: name.to_string(),
            labels,
            mountpoint: vol["Mountpoint"].as_str().map(String::from),
            created_at: vol["CreatedAt"].as_str().map(String::from),
        }
    }

    async fn volume_inspect(&self, name: &str) -> MlpipeResult<Option<VolumeInfo>> {
        let output = self.exec(&["volume", "inspect", name]).await?;
        if !output.status.success() {
            return Ok(None);
        }

        // Inspect returns an array even for a single volume
        let volumes: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout)?;
        Ok(volumes.first().map(|v| Self::parse_volume(name, v)))
    }
}

/// Podman reports locally built images under `localhost/`
fn strip_local_registry(reference: &str) -> &str {
    reference.strip_prefix("localhost/").unwrap_or(reference)
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn ensure_ready(&self) -> MlpipeResult<()> {
        if !Self::installed(self.kind).await {
            return Err(MlpipeError::EngineNotFound);
        }

        let output = self.exec(&["info"]).await?;
        if !output.status.success() {
            return Err(MlpipeError::EngineNotReady {
                program: self.program.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }

    async fn image_exists(&self, image: &str) -> MlpipeResult<bool> {
        let output = self
            .exec(&["image", "inspect", "--format", "{{.Id}}", image])
            .await?;
        Ok(output.status.success())
    }

    async fn pull(
        &self,
        image: &str,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<()> {
        info!("Pulling image: {}", image);

        let args = vec!["pull".to_string(), image.to_string()];
        let (code, output) = self.exec_streamed(&args, ctx, on_output, None).await?;

        if code != 0 {
            return Err(MlpipeError::ImagePull {
                image: image.to_string(),
                reason: super::error_tail(&output.stdout, &output.stderr),
            });
        }

        Ok(())
    }

    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<()> {
        let containerfile = context_dir.join("Containerfile");
        let args = vec![
            "build".to_string(),
            "-t".to_string(),
            tag.to_string(),
            "-f".to_string(),
            containerfile.display().to_string(),
            context_dir.display().to_string(),
        ];

        let (code, output) = self.exec_streamed(&args, ctx, on_output, None).await?;

        if code != 0 {
            return Err(MlpipeError::ImageBuild {
                tag: tag.to_string(),
                reason: super::error_tail(&output.stdout, &output.stderr),
            });
        }

        Ok(())
    }

    async fn image_list_prefixed(&self, prefix: &str) -> MlpipeResult<Vec<String>> {
        let output = self
            .exec_ok(&["images", "--format", "{{.Repository}}:{{.Tag}}"])
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let images: Vec<String> = stdout
            .lines()
            .map(strip_local_registry)
            .filter(|line| line.starts_with(prefix))
            .map(String::from)
            .collect();

        Ok(images)
    }

    async fn image_remove(&self, image: &str) -> MlpipeResult<()> {
        let output = self.exec(&["rmi", image]).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("image not known") || stderr.contains("No such image") {
            Ok(())
        } else {
            Err(MlpipeError::command_exec(self.describe(&["rmi", image]), stderr))
        }
    }

    async fn run(
        &self,
        spec: &RunSpec,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<RunOutput> {
        let mut args = vec!["run".to_string()];
        args.extend(spec.to_args());

        let (exit_code, output) = self
            .exec_streamed(&args, ctx, on_output, Some(&spec.name))
            .await?;

        debug!("Container {} exited with {}", spec.name, exit_code);

        Ok(RunOutput {
            container: spec.name.clone(),
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn commit(&self, container: &str, tag: &str) -> MlpipeResult<()> {
        let output = self.exec(&["commit", container, tag]).await?;

        if output.status.success() {
            debug!("Committed {} as {}", container, tag);
            Ok(())
        } else {
            Err(MlpipeError::Commit {
                container: container.to_string(),
                tag: tag.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    async fn create(&self, image: &str) -> MlpipeResult<String> {
        let output = self.exec_ok(&["create", image]).await?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if id.is_empty() {
            return Err(MlpipeError::Internal(format!(
                "{} create returned no container ID",
                self.program
            )));
        }

        Ok(id)
    }

    async fn copy_out(&self, container: &str, path: &str, dest: &Path) -> MlpipeResult<()> {
        let source = format!("{}:{}", container, path);
        let dest_str = dest.display().to_string();
        let output = self.exec(&["cp", &source, &dest_str]).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MlpipeError::CopyOut {
                path: path.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn remove(&self, container: &str) -> MlpipeResult<()> {
        debug!("Removing container: {}", container);

        let output = self.exec(&["rm", "-f", container]).await?;

        if output.status.success() {
            return Ok(());
        }

        // Ignore error if container doesn't exist
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no such container") || stderr.contains("No such container") {
            Ok(())
        } else {
            Err(MlpipeError::command_exec(self.describe(&["rm", "-f", container]), stderr))
        }
    }

    async fn volume_create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> MlpipeResult<()> {
        debug!("Creating volume: {}", name);

        let label_strings: Vec<String> =
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args = vec!["volume", "create"];
        for label in &label_strings {
            args.push("--label");
            args.push(label);
        }
        args.push(name);

        let output = self.exec(&args).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MlpipeError::CacheVolumeCreate {
                name: name.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn volume_exists(&self, name: &str) -> MlpipeResult<bool> {
        let output = self.exec(&["volume", "inspect", name]).await?;
        Ok(output.status.success())
    }

    async fn volume_list(&self, prefix: &str) -> MlpipeResult<Vec<VolumeInfo>> {
        let output = self
            .exec_ok(&["volume", "ls", "--format", "{{.Name}}"])
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut result = Vec::new();

        for name in stdout.lines().filter(|n| n.starts_with(prefix)) {
            if let Some(info) = self.volume_inspect(name).await? {
                result.push(info);
            }
        }

        Ok(result)
    }

    async fn volume_remove(&self, name: &str) -> MlpipeResult<()> {
        debug!("Removing volume: {}", name);

        let output = self.exec(&["volume", "rm", "-f", name]).await?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no such volume") || stderr.contains("No such volume") {
            Ok(())
        } else {
            Err(MlpipeError::command_exec(
                self.describe(&["volume", "rm", "-f", name]),
                stderr,
            ))
        }
    }

    fn runtime_name(&self) -> &'static str {
        match self.kind {
            EngineKind::Podman => "Podman",
            EngineKind::Docker => "Docker",
        }
    }
}
