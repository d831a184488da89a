//! Orchestration module for container runtimes
//!
//! Drives a container engine CLI on the host:
//! - Podman (preferred, rootless)
//! - Docker

mod cli_runtime;
mod factory;
mod runtime;
pub mod types;

pub use cli_runtime::{CliRuntime, EngineKind};
pub use factory::create_runtime;
pub use runtime::{ContainerRuntime, OutputSink};
pub use types::{RunOutput, RunSpec, VolumeInfo};

use crate::error::{MlpipeError, MlpipeResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of process output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn error_tail(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > ERROR_TAIL_LINES {
        lines[total - ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}

/// Captured output of a streamed child process
#[derive(Debug, Default)]
pub(crate) struct StreamedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Take the piped stdout+stderr out of a child process.
///
/// The caller keeps the process handle, so it can kill the child while the
/// pipes are still being read.
pub(crate) fn take_pipes(
    child: &mut Child,
) -> MlpipeResult<(tokio::process::ChildStdout, tokio::process::ChildStderr)> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MlpipeError::Internal("child stdout not piped".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MlpipeError::Internal("child stderr not piped".to_string()))?;
    Ok((stdout, stderr))
}

/// Read both pipes to completion, keeping them separate and forwarding each
/// line to `on_output` as it arrives.
pub(crate) async fn stream_output<O, E>(
    stdout: O,
    stderr: E,
    on_output: OutputSink<'_>,
) -> StreamedOutput
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_reader = BufReader::new(stderr).lines();

    let mut out = StreamedOutput::default();
    let mut stdout_done = false;
    let mut stderr_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        out.stderr.push_str(&line);
                        out.stderr.push('\n');
                        on_output(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        out.stdout.push_str(&line);
                        out.stdout.push('\n');
                        on_output(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    out
}
