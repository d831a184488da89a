//! Pipeline stage commands

use crate::cli::args::StageArgs;
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_FILE};
use crate::container::Executor;
use crate::context::ExecContext;
use crate::error::{MlpipeError, MlpipeResult};
use crate::orchestration::create_runtime;
use crate::pipeline::Pipeline;
use crate::source::Directory;
use crate::ui::{self, StepProgress, UiContext};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A pipeline stage selected on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    BuildEnv,
    PrepareData,
    Train,
    Select,
    /// Export the model file to this host path
    Download(PathBuf),
    ProcessData,
    Test,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::BuildEnv => "build-env",
            Stage::PrepareData => "prepare-data",
            Stage::Train => "train",
            Stage::Select => "select",
            Stage::Download(_) => "download",
            Stage::ProcessData => "process-data",
            Stage::Test => "test",
        }
    }
}

/// What a stage produced
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    /// Tag of the final layer
    Image(String),
    /// Captured stdout of the last step
    Stdout(String),
    /// Host path of an exported file
    File(PathBuf),
}

/// Execute a pipeline stage
pub async fn execute(
    stage: Stage,
    args: StageArgs,
    config: &Config,
    exec_ctx: &ExecContext,
    echo_output: bool,
) -> MlpipeResult<()> {
    let ui_ctx = UiContext::detect();
    let cwd = std::env::current_dir()
        .map_err(|e| MlpipeError::io("getting current directory", e))?;
    let src = resolve_src(args.src.as_deref(), &cwd)?;
    debug!("Project directory: {}", src.display());

    let runtime = create_runtime(config).await?;
    runtime.ensure_ready().await?;

    ui::intro(&ui_ctx, &format!("mlpipe {}", stage.name()));
    ui::key_value(&ui_ctx, "engine", runtime.runtime_name());
    ui::key_value(&ui_ctx, "source", &src.display().to_string());
    if let Some(provider) = ui_ctx.ci_provider() {
        ui::key_value(&ui_ctx, "ci", provider);
    }

    let pipeline = Pipeline::new(config);
    let source = pipeline.source(&src);
    let progress = StepProgress::new(&ui_ctx, stage.name(), echo_output);
    let exec = Executor::new(runtime.as_ref(), ConfigManager::builds_dir())
        .reuse_layers(config.engine.reuse_layers && !args.no_cache)
        .with_observer(&progress);

    let result = run_stage(&stage, &pipeline, &source, &exec, exec_ctx).await;
    progress.finish();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            ui::outro_error(&ui_ctx, &format!("{} failed", stage.name()));
            return Err(e);
        }
    };

    match outcome {
        Outcome::Image(tag) => {
            ui::outro_success(&ui_ctx, &format!("{} complete", stage.name()));
            println!("{}", tag);
        }
        Outcome::Stdout(out) => {
            ui::outro_success(&ui_ctx, &format!("{} complete", stage.name()));
            print!("{}", out);
        }
        Outcome::File(path) => {
            ui::outro_success(&ui_ctx, &format!("Model exported to {}", path.display()));
            println!("{}", path.display());
        }
    }

    Ok(())
}

async fn run_stage(
    stage: &Stage,
    pipeline: &Pipeline,
    source: &Directory,
    exec: &Executor<'_>,
    ctx: &ExecContext,
) -> MlpipeResult<Outcome> {
    let handle = match stage {
        Stage::BuildEnv => pipeline.build_env(source),
        Stage::PrepareData => pipeline.prepare_data(source),
        Stage::Train => pipeline.train(source),
        Stage::Select => pipeline.select(source),
        Stage::Download(output) => {
            let path = pipeline.download(source).export(exec, ctx, output).await?;
            return Ok(Outcome::File(path));
        }
        Stage::ProcessData => {
            return Ok(Outcome::Stdout(
                pipeline.process_data(source, exec, ctx).await?,
            ));
        }
        Stage::Test => return Ok(Outcome::Stdout(pipeline.test(source, exec, ctx).await?)),
    };

    Ok(Outcome::Image(handle.sync(exec, ctx).await?))
}

/// Nearest ancestor of `start` holding a local config or a git checkout
fn project_root(start: &Path) -> &Path {
    start
        .ancestors()
        .find(|dir| dir.join(LOCAL_CONFIG_FILE).is_file() || dir.join(".git").exists())
        .unwrap_or(start)
}

/// An explicit `--src` is taken relative to `cwd`; otherwise the project root
fn resolve_src(src: Option<&Path>, cwd: &Path) -> MlpipeResult<PathBuf> {
    let path = match src {
        Some(path) => cwd.join(path),
        None => project_root(cwd).to_path_buf(),
    };

    if !path.is_dir() {
        return Err(MlpipeError::PathNotFound(path));
    }

    path.canonicalize()
        .map_err(|e| MlpipeError::io(format!("resolving {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("requirements.txt"), "pytest\n").unwrap();
        temp
    }

    #[test]
    fn stage_names_match_commands() {
        assert_eq!(Stage::BuildEnv.name(), "build-env");
        assert_eq!(Stage::Download(PathBuf::from("m.pkl")).name(), "download");
        assert_eq!(Stage::ProcessData.name(), "process-data");
    }

    #[test]
    fn missing_src_is_reported() {
        let cwd = TempDir::new().unwrap();
        let err = resolve_src(Some(Path::new("/definitely/not/here")), cwd.path()).unwrap_err();
        assert!(matches!(err, MlpipeError::PathNotFound(_)));
    }

    #[test]
    fn default_src_is_the_enclosing_checkout() {
        let temp = project();
        std::fs::create_dir_all(temp.path().join(".git")).unwrap();
        let nested = temp.path().join("itu_sdse_project").join("modeling");
        std::fs::create_dir_all(&nested).unwrap();

        let src = resolve_src(None, &nested).unwrap();
        assert_eq!(src, temp.path().canonicalize().unwrap());

        let explicit = resolve_src(Some(Path::new("itu_sdse_project")), temp.path()).unwrap();
        assert_eq!(explicit, temp.path().join("itu_sdse_project").canonicalize().unwrap());
    }

    #[test]
    fn local_config_marks_the_project_root() {
        let temp = project();
        std::fs::write(temp.path().join(LOCAL_CONFIG_FILE), "").unwrap();
        let nested = temp.path().join("data").join("raw");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(project_root(&nested), temp.path());
    }

    #[tokio::test]
    async fn image_stages_return_the_final_tag() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());
        let source = pipeline.source(temp.path());

        let outcome = run_stage(&Stage::Select, &pipeline, &source, &exec, &ExecContext::background())
            .await
            .unwrap();

        match outcome {
            Outcome::Image(tag) => assert!(tag.starts_with(crate::container::LAYER_PREFIX)),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(runtime.executed().last().unwrap().ends_with("selection.py"));
    }

    #[tokio::test]
    async fn download_writes_to_requested_path() {
        let temp = project();
        let builds = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let exec = Executor::new(&runtime, builds.path());
        let pipeline = Pipeline::new(&Config::default());
        let source = pipeline.source(temp.path());
        let dest = out.path().join("model.pkl");

        let outcome = run_stage(
            &Stage::Download(dest.clone()),
            &pipeline,
            &source,
            &exec,
            &ExecContext::background(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::File(dest.clone()));
        assert!(dest.is_file());
    }
}
