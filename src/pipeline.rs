//! The ML pipeline stages
//!
//! Each stage extends the previous one's container handle. Building a handle
//! is pure; the engine only runs when a handle is evaluated.

use crate::config::schema::{Config, DatasetConfig, RegistryConfig, ScriptsConfig};
use crate::container::{Container, Executor, FileRef};
use crate::context::ExecContext;
use crate::error::MlpipeResult;
use crate::source::{Directory, ExcludeSet};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Builds the container handle for every pipeline stage
#[derive(Debug, Clone)]
pub struct Pipeline {
    base_image: String,
    workdir: String,
    env: BTreeMap<String, String>,
    exclude: ExcludeSet,
    cache: Option<(String, String)>,
    requirements: String,
    dataset: DatasetConfig,
    scripts: ScriptsConfig,
    registry: RegistryConfig,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            base_image: config.image.base.clone(),
            workdir: config.image.workdir.clone(),
            env: config.image.env.clone(),
            exclude: ExcludeSet::new(&config.source.exclude),
            cache: config
                .cache
                .enabled
                .then(|| (config.cache.path.clone(), config.cache.volume.clone())),
            requirements: config.cache.requirements.clone(),
            dataset: config.dataset.clone(),
            scripts: config.scripts.clone(),
            registry: config.registry.clone(),
        }
    }

    /// Reference a project tree with the configured exclusions
    pub fn source(&self, root: impl AsRef<Path>) -> Directory {
        Directory::new(root.as_ref()).with_exclude(self.exclude.clone())
    }

    fn script(&self, script: &str, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.scripts.interpreter.clone(), script.to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    fn create_training_data(&self, env: &Container) -> Container {
        env.with_exec(
            self.script(&self.scripts.dataset, &[self.scripts.dataset_command.as_str()])
                .as_slice(),
        )
    }

    /// Base image with the project source, dependencies and raw dataset
    pub fn build_env(&self, src: &Directory) -> Container {
        let src = src.with_exclude(self.exclude.clone());

        let mut env = Container::from_image(&self.base_image)
            .with_directory(&self.workdir, &src)
            .with_workdir(&self.workdir);

        for (key, value) in &self.env {
            env = env.with_env_variable(key, value);
        }

        if let Some((path, volume)) = &self.cache {
            env = env.with_mounted_cache(path, volume);
        }

        env = env.with_exec(&["pip", "install", "-r", self.requirements.as_str()]);

        if self.dataset.enabled {
            env = env
                .with_exec(&["pip", "install", self.dataset.tool.as_str()])
                .with_exec(&[
                    self.dataset.tool.as_str(),
                    "get",
                    self.dataset.repo_url.as_str(),
                    self.dataset.file.as_str(),
                    "-o",
                    self.dataset.output.as_str(),
                ]);
        } else {
            debug!("Dataset fetch disabled");
        }

        env
    }

    /// Environment plus training data and engineered features
    pub fn prepare_data(&self, src: &Directory) -> Container {
        let data = self.create_training_data(&self.build_env(src));
        data.with_exec(self.script(&self.scripts.features, &[]).as_slice())
    }

    /// Prepared data plus one training run per configured algorithm, in order
    pub fn train(&self, src: &Directory) -> Container {
        self.scripts
            .algorithms
            .iter()
            .fold(self.prepare_data(src), |c, algorithm| {
                c.with_exec(self.script(&self.scripts.train, &[algorithm.as_str()]).as_slice())
            })
    }

    /// Trained models plus the selection script, which stages the winner
    pub fn select(&self, src: &Directory) -> Container {
        self.train(src)
            .with_exec(self.script(&self.scripts.selection, &[]).as_slice())
    }

    /// Registry URI of the staged model
    pub fn model_uri(&self) -> String {
        format!(
            "models:/{}@{}",
            self.registry.model_name, self.registry.alias
        )
    }

    /// The staged model artifact, fetched from the registry
    pub fn download(&self, src: &Directory) -> FileRef {
        let dir = self.registry.download_dir.trim_end_matches('/');
        let uri = self.model_uri();

        self.select(src)
            .with_exec(&[
                self.registry.cli.as_str(),
                "artifacts",
                "download",
                "--artifact-uri",
                uri.as_str(),
                "--dst-path",
                dir,
            ])
            .file(format!("{}/{}", dir, self.registry.artifact_file))
    }

    /// Create the training data and list the interim directory
    pub async fn process_data(
        &self,
        src: &Directory,
        exec: &Executor<'_>,
        ctx: &ExecContext,
    ) -> MlpipeResult<String> {
        self.create_training_data(&self.build_env(src))
            .with_exec(&["ls", self.scripts.interim_dir.as_str()])
            .stdout(exec, ctx)
            .await
    }

    /// Run the project's test suite and return its output
    pub async fn test(
        &self,
        src: &Directory,
        exec: &Executor<'_>,
        ctx: &ExecContext,
    ) -> MlpipeResult<String> {
        self.build_env(src)
            .with_exec(self.scripts.test_runner.as_slice())
            .stdout(exec, ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MlpipeError;
    use crate::testing::FakeRuntime;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("requirements.txt"), "pandas\nxgboost\n").unwrap();
        std::fs::create_dir_all(root.join("itu_sdse_project/modeling")).unwrap();
        std::fs::write(root.join("itu_sdse_project/dataset.py"), "").unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::create_dir_all(root.join("data/interim")).unwrap();
        std::fs::write(root.join("data/interim/stale.csv"), "x\n").unwrap();
        temp
    }

    fn commands(c: &Container) -> Vec<String> {
        c.exec_steps().map(|s| s.label()).collect()
    }

    const SETUP: [&str; 3] = [
        "pip install -r requirements.txt",
        "pip install dvc",
        "dvc get https://github.com/Jeppe-T-K/itu-sdse-project-data raw_data.csv -o data/raw/raw_data.csv",
    ];

    #[test]
    fn build_env_installs_and_fetches() {
        let pipeline = Pipeline::new(&Config::default());
        let env = pipeline.build_env(&Directory::new("."));

        assert_eq!(env.base_image(), "python:3.12.2-bookworm");
        assert_eq!(env.workdir(), "/app");
        assert_eq!(commands(&env), SETUP);

        let step = env.exec_steps().next().unwrap();
        assert_eq!(step.mounts[0].volume_arg(), "mlpipe-cache-pip:/root/.cache/pip");
    }

    #[test]
    fn dataset_fetch_can_be_disabled() {
        let mut config = Config::default();
        config.dataset.enabled = false;
        config.cache.enabled = false;

        let env = Pipeline::new(&config).build_env(&Directory::new("."));

        assert_eq!(commands(&env), vec!["pip install -r requirements.txt"]);
        assert!(env.exec_steps().next().unwrap().mounts.is_empty());
    }

    #[tokio::test]
    async fn configured_env_reaches_every_step() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let exec = Executor::new(&runtime, builds.path());
        let mut config = Config::default();
        config
            .image
            .env
            .insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        let pipeline = Pipeline::new(&config);

        pipeline
            .test(&pipeline.source(temp.path()), &exec, &ExecContext::background())
            .await
            .unwrap();

        let runs = runtime.runs();
        assert!(!runs.is_empty());
        for run in runs {
            assert_eq!(run.env.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        }
    }

    #[test]
    fn stages_compose_linearly() {
        let pipeline = Pipeline::new(&Config::default());
        let src = Directory::new(".");

        let select = pipeline.select(&src);
        let tail: Vec<String> = commands(&select).into_iter().skip(SETUP.len()).collect();

        assert_eq!(
            tail,
            vec![
                "python itu_sdse_project/dataset.py create-training-data",
                "python itu_sdse_project/features.py",
                "python itu_sdse_project/modeling/train.py xgboost",
                "python itu_sdse_project/modeling/train.py log-reg",
                "python itu_sdse_project/modeling/selection.py",
            ]
        );
        assert_eq!(pipeline.train(&src).depth() + 1, select.depth());
    }

    #[test]
    fn download_targets_staged_alias() {
        let pipeline = Pipeline::new(&Config::default());
        let file = pipeline.download(&Directory::new("."));

        let last = file.container().exec_steps().last().unwrap().label();
        assert_eq!(
            last,
            "mlflow artifacts download --artifact-uri models:/lead_model@staging --dst-path /tmp/model"
        );
        assert_eq!(file.path(), "/tmp/model/artifacts/model.pkl");
    }

    #[tokio::test]
    async fn test_runner_runs_exactly_once() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().stdout_for("pytest", "3 passed\n");
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        let out = pipeline
            .test(&pipeline.source(temp.path()), &exec, &ExecContext::background())
            .await
            .unwrap();

        assert_eq!(out, "3 passed\n");
        let runs = runtime.executed();
        assert_eq!(runs.iter().filter(|c| *c == "pytest").count(), 1);
        assert_eq!(runs.last().map(String::as_str), Some("pytest"));
    }

    #[tokio::test]
    async fn source_copy_skips_excluded_paths() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        pipeline
            .test(&Directory::new(temp.path()), &exec, &ExecContext::background())
            .await
            .unwrap();

        let built = runtime.built();
        assert_eq!(built.len(), 1);
        let files = &built[0].2;
        assert!(files.contains(&"requirements.txt".to_string()));
        assert!(files.contains(&"itu_sdse_project/dataset.py".to_string()));
        assert!(!files.iter().any(|f| f.starts_with(".git")));
        assert!(!files.iter().any(|f| f.starts_with("data/interim/")));
    }

    #[tokio::test]
    async fn process_data_lists_interim_dir() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().stdout_for("ls data/interim", "train_data_gold.csv\n");
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        let out = pipeline
            .process_data(&pipeline.source(temp.path()), &exec, &ExecContext::background())
            .await
            .unwrap();

        assert_eq!(out, "train_data_gold.csv\n");
        let runs = runtime.executed();
        let create = runs.iter().position(|c| c.contains("create-training-data"));
        let list = runs.iter().position(|c| c == "ls data/interim");
        assert!(create.unwrap() < list.unwrap());
    }

    #[tokio::test]
    async fn process_data_stops_when_dataset_script_fails() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().fail_on("create-training-data");
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        let err = pipeline
            .process_data(&pipeline.source(temp.path()), &exec, &ExecContext::background())
            .await
            .unwrap_err();

        assert!(matches!(err, MlpipeError::StepFailed { code: 1, .. }));
        assert!(!runtime.executed().iter().any(|c| c.starts_with("ls")));
    }

    #[tokio::test]
    async fn failed_training_skips_the_next_one() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().fail_on("train.py xgboost");
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        let err = pipeline
            .train(&pipeline.source(temp.path()))
            .sync(&exec, &ExecContext::background())
            .await
            .unwrap_err();

        match err {
            MlpipeError::StepFailed { command, .. } => {
                assert_eq!(command, "python itu_sdse_project/modeling/train.py xgboost");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!runtime.executed().iter().any(|c| c.ends_with("log-reg")));
    }

    #[tokio::test]
    async fn trainings_run_in_declared_order() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        pipeline
            .train(&pipeline.source(temp.path()))
            .sync(&exec, &ExecContext::background())
            .await
            .unwrap();

        let runs = runtime.executed();
        let xgb = runs.iter().position(|c| c.ends_with("xgboost")).unwrap();
        let logreg = runs.iter().position(|c| c.ends_with("log-reg")).unwrap();
        assert!(xgb < logreg);
        assert_eq!(runtime.volume_names(), vec!["mlpipe-cache-pip"]);
        for run in runtime.runs() {
            assert_eq!(run.workdir, "/app");
            assert_eq!(run.volumes, vec!["mlpipe-cache-pip:/root/.cache/pip"]);
        }
    }

    #[tokio::test]
    async fn download_fails_without_staged_artifact() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().missing_file("/tmp/model/artifacts/model.pkl");
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        let err = pipeline
            .download(&pipeline.source(temp.path()))
            .export(&exec, &ExecContext::background(), &out.path().join("model.pkl"))
            .await
            .unwrap_err();

        assert!(matches!(err, MlpipeError::CopyOut { .. }));
        assert!(!out.path().join("model.pkl").exists());
        assert_eq!(runtime.live_containers(), 0);
    }

    #[tokio::test]
    async fn download_fails_when_alias_does_not_resolve() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().fail_on("@staging");
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());

        let err = pipeline
            .download(&pipeline.source(temp.path()))
            .export(&exec, &ExecContext::background(), &out.path().join("model.pkl"))
            .await
            .unwrap_err();

        assert!(matches!(err, MlpipeError::StepFailed { .. }));
    }
}
