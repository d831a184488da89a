//! Terminal output
//!
//! Uses `cliclack` and `indicatif` in interactive terminals, with plain
//! `[OK]`-style lines on CI runners and when stderr is redirected.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_error, outro_success, remark, section, step_info, step_ok,
    step_warn_hint,
};
pub use progress::{StepProgress, TaskSpinner};
pub use prompts::confirm;
