//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// mlpipe - Container pipeline for the lead-scoring model
///
/// Builds the project environment in a container and runs data preparation,
/// training, model selection, artifact download and tests as cached layers.
#[derive(Parser, Debug)]
#[command(name = "mlpipe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MLPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .mlpipe.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the environment: source, dependencies and raw dataset
    BuildEnv(StageArgs),

    /// Build the environment, then create training data and features
    PrepareData(StageArgs),

    /// Prepare data, then train every configured model
    Train(StageArgs),

    /// Train, then select and stage the best model
    Select(StageArgs),

    /// Select, then download the staged model artifact to the host
    Download(DownloadArgs),

    /// Create training data and list the interim directory
    ProcessData(StageArgs),

    /// Run the project's test suite in the environment
    Test(StageArgs),

    /// Manage cache volumes and layer images
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments shared by every pipeline stage
#[derive(Args, Debug, Clone)]
pub struct StageArgs {
    /// Project directory (defaults to the enclosing project root)
    #[arg(short, long)]
    pub src: Option<PathBuf>,

    /// Re-run every layer instead of reusing materialized ones
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments for the download command
#[derive(Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    /// Where to write the model file on the host
    #[arg(short, long, default_value = "model.pkl")]
    pub output: PathBuf,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cache volumes and layer images
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove cache volumes, and optionally layer images
    Clear {
        /// Also remove materialized layer images
        #[arg(long)]
        images: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
