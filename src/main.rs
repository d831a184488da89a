//! mlpipe - container pipeline runner
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mlpipe::cli::commands::{self, Stage};
use mlpipe::cli::{Cli, Commands};
use mlpipe::config::{Config, ConfigManager};
use mlpipe::context::ExecContext;
use mlpipe::error::{MlpipeError, MlpipeResult};
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, config: &Config) {
    // 0 = warn (progress only), 1 = info, 2+ = debug
    let level = match verbose {
        0 if config.general.verbose => "info",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("mlpipe={}", level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

async fn run() -> MlpipeResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // Find local config unless --no-local is set
    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| MlpipeError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    if let Some(ref path) = local_config_path {
        debug!("Found local config: {}", path.display());
    }

    let (exec_ctx, cancel) = ExecContext::with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, cancelling running step (press Ctrl-C again to force quit)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{} forced exit", style("Interrupted:").red().bold());
            std::process::exit(130);
        }
    });

    let (stage, args) = match cli.command {
        Commands::Config(args) => return commands::config(args, &config, &config_manager).await,
        Commands::Cache(args) => return commands::cache(args, &config).await,
        Commands::BuildEnv(args) => (Stage::BuildEnv, args),
        Commands::PrepareData(args) => (Stage::PrepareData, args),
        Commands::Train(args) => (Stage::Train, args),
        Commands::Select(args) => (Stage::Select, args),
        Commands::Download(args) => (Stage::Download(args.output), args.stage),
        Commands::ProcessData(args) => (Stage::ProcessData, args),
        Commands::Test(args) => (Stage::Test, args),
    };

    ConfigManager::ensure_state_dirs().await?;
    commands::stage(stage, args, &config, &exec_ctx, cli.verbose > 0).await
}
