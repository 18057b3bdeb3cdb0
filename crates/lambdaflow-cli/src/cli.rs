use clap::{Args, Parser, Subcommand};
use lambdaflow::engine::config::Platform;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "lambdaflow CLI - Checkpointed, restartable execution of alchemical free-energy lambda windows.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Maximum number of CPU threads shared by all windows.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every lambda window of an alchemical calculation.
    Run(RunArgs),
    /// Summarise an energy trajectory file written by a window.
    Inspect(InspectArgs),
    /// Write a small perturbable test system to get started with.
    Init(InitArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the input system in JSON format (see `lambdaflow init`).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory all window output is written to.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Resume from the checkpoints in the output directory.
    #[arg(long)]
    pub restart: bool,

    // --- Lambda Overrides ---
    /// Number of evenly spaced lambda windows.
    #[arg(short = 'n', long, value_name = "INT")]
    pub num_lambda: Option<usize>,

    // --- Dynamics Overrides ---
    /// Production runtime per window, e.g. '100ps' or '1ns'.
    #[arg(short, long, value_name = "TIME")]
    pub runtime: Option<String>,

    /// Integration timestep, e.g. '4fs'.
    #[arg(short, long, value_name = "TIME")]
    pub timestep: Option<String>,

    /// Simulation temperature in Kelvin.
    #[arg(long, value_name = "FLOAT")]
    pub temperature: Option<f64>,

    /// Skip energy minimisation before dynamics.
    #[arg(long)]
    pub no_minimise: bool,

    /// Equilibration time before production, e.g. '10ps'.
    #[arg(long, value_name = "TIME")]
    pub equilibration_time: Option<String>,

    // --- Resource Overrides ---
    /// Compute platform for the physics engine.
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<Platform>,

    /// Run windows concurrently instead of one after another.
    #[arg(long)]
    pub parallel: bool,

    /// Maximum number of devices to use for a parallel device run.
    #[arg(long, value_name = "INT")]
    pub max_gpus: Option<usize>,

    /// Seed for the reference engine's thermostat, for reproducible runs.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S output.checkpoint-frequency=50ps
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to an energy trajectory file (energy_traj_<lambda>.csv).
    #[arg(required = true, value_name = "PATH")]
    pub path: PathBuf,
}

/// Arguments for the `init` subcommand.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path the test system is written to.
    #[arg(short, long, default_value = "system.json", value_name = "PATH")]
    pub output: PathBuf,

    /// Also write a configuration file with every default spelled out.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Overwrite existing files.
    #[arg(long)]
    pub force: bool,
}
