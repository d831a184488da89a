//! Terminal detection for progress output
//!
//! Stage results (image tags, captured stdout) go to stdout so they can be
//! piped. Progress goes to stderr, so interactivity is judged on stderr.

use std::io::IsTerminal;

/// Environment variables set by common CI providers
const CI_VARS: &[(&str, &str)] = &[
    ("GITHUB_ACTIONS", "GitHub Actions"),
    ("GITLAB_CI", "GitLab CI"),
    ("CIRCLECI", "CircleCI"),
    ("BUILDKITE", "Buildkite"),
    ("JENKINS_URL", "Jenkins"),
    ("TF_BUILD", "Azure Pipelines"),
    ("CI", "CI"),
];

/// Output mode for the current process
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    auto_yes: bool,
    ci: Option<&'static str>,
}

impl UiContext {
    /// Detect the current environment
    pub fn detect() -> Self {
        let ci = detect_ci(|name| std::env::var_os(name).is_some());
        Self {
            interactive: ci.is_none()
                && std::io::stderr().is_terminal()
                && std::io::stdin().is_terminal(),
            auto_yes: false,
            ci,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
            ci: None,
        }
    }

    /// Answer every confirmation with yes
    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Spinners and progress bars instead of plain lines
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }

    /// Name of the detected CI provider
    pub fn ci_provider(&self) -> Option<&'static str> {
        self.ci
    }
}

fn detect_ci(is_set: impl Fn(&str) -> bool) -> Option<&'static str> {
    CI_VARS
        .iter()
        .find(|(var, _)| is_set(var))
        .map(|(_, name)| *name)
}
