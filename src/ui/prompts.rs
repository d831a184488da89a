//! Confirmation prompt with non-interactive fallback

use super::context::UiContext;
use crate::error::{MlpipeError, MlpipeResult};

/// Ask a yes/no question.
///
/// Auto-yes answers yes. Without a terminal the default is returned.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> MlpipeResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on stdin
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| MlpipeError::Internal(format!("prompt task failed: {}", e)))?
    .map_err(|e| MlpipeError::User(format!("Prompt failed: {}", e)))
}
