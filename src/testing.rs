//! In-memory container runtime for unit tests

use crate::context::ExecContext;
use crate::error::{MlpipeError, MlpipeResult};
use crate::orchestration::{ContainerRuntime, OutputSink, RunOutput, RunSpec, VolumeInfo};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    images: HashSet<String>,
    pulled: Vec<String>,
    executed: Vec<String>,
    runs: Vec<RunSpec>,
    built: Vec<(String, String, Vec<String>)>,
    containers: HashMap<String, String>,
    volumes: HashMap<String, HashMap<String, String>>,
    next_id: usize,
}

/// Records every call and simulates a well-behaved engine.
///
/// Exec steps print their own command line. A step fails with exit code 1
/// when its command line contains one of the configured failure markers.
#[derive(Default)]
pub(crate) struct FakeRuntime {
    state: Mutex<State>,
    fail_on: Vec<String>,
    missing_files: Vec<String>,
    stdout_for: Vec<(String, String)>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any step whose command line contains `marker`
    pub fn fail_on(mut self, marker: &str) -> Self {
        self.fail_on.push(marker.to_string());
        self
    }

    /// Make `copy_out` of `path` fail
    pub fn missing_file(mut self, path: &str) -> Self {
        self.missing_files.push(path.to_string());
        self
    }

    /// Print `stdout` for steps whose command line contains `marker`
    pub fn stdout_for(mut self, marker: &str, stdout: &str) -> Self {
        self.stdout_for
            .push((marker.to_string(), stdout.to_string()));
        self
    }

    /// Command lines of every exec that ran, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    /// Every run spec, in order
    pub fn runs(&self) -> Vec<RunSpec> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.state.lock().unwrap().pulled.clone()
    }

    /// (tag, Containerfile, staged files) for every build
    pub fn built(&self) -> Vec<(String, String, Vec<String>)> {
        self.state.lock().unwrap().built.clone()
    }

    pub fn live_containers(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().volumes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn add_image(&self, image: &str) {
        self.state.lock().unwrap().images.insert(image.to_string());
    }

    fn new_container(&self, image: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        state.containers.insert(id.clone(), image.to_string());
        id
    }
}

fn staged_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })
        .collect();
    files.sort();
    files
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ensure_ready(&self) -> MlpipeResult<()> {
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> MlpipeResult<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull(
        &self,
        image: &str,
        ctx: &ExecContext,
        _on_output: OutputSink<'_>,
    ) -> MlpipeResult<()> {
        if ctx.is_cancelled() {
            return Err(MlpipeError::Cancelled);
        }

        let mut state = self.state.lock().unwrap();
        state.pulled.push(image.to_string());
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        _ctx: &ExecContext,
        _on_output: OutputSink<'_>,
    ) -> MlpipeResult<()> {
        let containerfile = std::fs::read_to_string(context_dir.join("Containerfile"))
            .map_err(|e| MlpipeError::io("reading Containerfile", e))?;
        let files = staged_files(&context_dir.join("src"));

        let mut state = self.state.lock().unwrap();
        state.built.push((tag.to_string(), containerfile, files));
        state.images.insert(tag.to_string());
        Ok(())
    }

    async fn image_list_prefixed(&self, prefix: &str) -> MlpipeResult<Vec<String>> {
        let mut images: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .images
            .iter()
            .filter(|i| i.starts_with(prefix))
            .cloned()
            .collect();
        images.sort();
        Ok(images)
    }

    async fn image_remove(&self, image: &str) -> MlpipeResult<()> {
        self.state.lock().unwrap().images.remove(image);
        Ok(())
    }

    async fn run(
        &self,
        spec: &RunSpec,
        ctx: &ExecContext,
        on_output: OutputSink<'_>,
    ) -> MlpipeResult<RunOutput> {
        if ctx.is_cancelled() {
            return Err(MlpipeError::Cancelled);
        }

        let line = spec.command.join(" ");
        {
            let mut state = self.state.lock().unwrap();
            state.executed.push(line.clone());
            state.runs.push(spec.clone());
            state.containers.insert(spec.name.clone(), spec.image.clone());
        }

        let failed = self.fail_on.iter().any(|m| line.contains(m.as_str()));
        let stdout = self
            .stdout_for
            .iter()
            .find(|(m, _)| line.contains(m.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| format!("{}\n", line));

        for l in stdout.lines() {
            on_output(l.to_string());
        }

        Ok(RunOutput {
            container: spec.name.clone(),
            exit_code: if failed { 1 } else { 0 },
            stdout,
            stderr: if failed {
                format!("{}: failed\n", line)
            } else {
                String::new()
            },
        })
    }

    async fn commit(&self, container: &str, tag: &str) -> MlpipeResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.containers.contains_key(container) {
            return Err(MlpipeError::Commit {
                container: container.to_string(),
                tag: tag.to_string(),
                reason: "no such container".to_string(),
            });
        }
        state.images.insert(tag.to_string());
        Ok(())
    }

    async fn create(&self, image: &str) -> MlpipeResult<String> {
        Ok(self.new_container(image))
    }

    async fn copy_out(&self, container: &str, path: &str, dest: &Path) -> MlpipeResult<()> {
        if self.missing_files.iter().any(|m| m == path) {
            return Err(MlpipeError::CopyOut {
                path: path.to_string(),
                reason: format!("no such file in {}", container),
            });
        }
        std::fs::write(dest, format!("{}:{}", container, path))
            .map_err(|e| MlpipeError::io("writing export", e))
    }

    async fn remove(&self, container: &str) -> MlpipeResult<()> {
        self.state.lock().unwrap().containers.remove(container);
        Ok(())
    }

    async fn volume_create(
        &self,
        name: &str,
        labels: &HashMap<String, String>,
    ) -> MlpipeResult<()> {
        self.state
            .lock()
            .unwrap()
            .volumes
            .insert(name.to_string(), labels.clone());
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> MlpipeResult<bool> {
        Ok(self.state.lock().unwrap().volumes.contains_key(name))
    }

    async fn volume_list(&self, prefix: &str) -> MlpipeResult<Vec<VolumeInfo>> {
        let state = self.state.lock().unwrap();
        let mut volumes: Vec<VolumeInfo> = state
            .volumes
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, labels)| VolumeInfo {
                name: name.clone(),
                labels: labels.clone(),
                ..Default::default()
            })
            .collect();
        volumes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(volumes)
    }

    async fn volume_remove(&self, name: &str) -> MlpipeResult<()> {
        self.state.lock().unwrap().volumes.remove(name);
        Ok(())
    }

    fn runtime_name(&self) -> &'static str {
        "Fake"
    }
}
