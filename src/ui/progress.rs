//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::container::StepObserver;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Longest output line shown next to the progress bar
const MAX_MESSAGE: usize = 60;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            eprintln!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            eprintln!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            eprintln!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Per-layer progress for a pipeline stage.
///
/// Interactive terminals get an indicatif bar whose message follows the
/// running step's output. Otherwise each step is printed as a plain line,
/// and step output is echoed only when `echo_output` is set.
pub struct StepProgress {
    bar: Option<ProgressBar>,
    echo_output: bool,
}

impl StepProgress {
    pub fn new(ctx: &UiContext, stage: &str, echo_output: bool) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(0);
            if let Ok(template) = ProgressStyle::default_bar().template(
                "  {spinner:.cyan} {prefix}  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(
                    template
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.set_prefix(stage.to_string());
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            eprintln!("Running {}...", stage);
            None
        };

        Self { bar, echo_output }
    }

    /// Clear the bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

impl StepObserver for StepProgress {
    fn step_started(&self, index: usize, total: usize, label: &str) {
        match self.bar {
            Some(ref bar) => {
                bar.set_length(total as u64);
                bar.set_position(index.saturating_sub(1) as u64);
                bar.set_message(shorten(label));
            }
            None => eprintln!("  [{}/{}] {}", index, total, label),
        }
    }

    fn step_cached(&self, index: usize, total: usize, label: &str) {
        match self.bar {
            Some(ref bar) => {
                bar.set_length(total as u64);
                bar.set_position(index as u64);
            }
            None => eprintln!("  [{}/{}] {} {}", index, total, label, style("(cached)").dim()),
        }
    }

    fn output_line(&self, line: String) {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_build_noise(trimmed) {
            return;
        }

        match self.bar {
            Some(ref bar) => bar.set_message(shorten(trimmed)),
            None if self.echo_output => eprintln!("      {}", trimmed),
            None => {}
        }
    }
}

fn shorten(line: &str) -> String {
    if line.chars().count() > MAX_MESSAGE {
        let head: String = line.chars().take(MAX_MESSAGE - 3).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

/// Engine bookkeeping lines from image builds
fn is_build_noise(line: &str) -> bool {
    line.starts_with("STEP ")
        || line.starts_with("--->")
        || line.starts_with("-->")
        || line.starts_with("COMMIT")
        || line.starts_with("Successfully tagged")
        || line.starts_with("Removing intermediate")
}
