//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::MlpipeResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> MlpipeResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => println!("{}", toml::to_string_pretty(config)?),
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => {
            init_config(&UiContext::detect(), manager, force).await?;
        }
    }

    Ok(())
}

/// Write the default configuration. Returns false when a file already
/// exists and `force` is not set.
async fn init_config(ctx: &UiContext, manager: &ConfigManager, force: bool) -> MlpipeResult<bool> {
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(false);
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(ctx, &format!("Configuration written to {}", path.display()));

    Ok(true)
}
