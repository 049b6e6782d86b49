use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "SimWeave Developers",
    version,
    about = "SimWeave CLI - render templated inputs, run simulation codes in isolated workspaces, and couple them to outer optimization tools.",
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
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a template with parameters without running anything.
    Render(RenderArgs),
    /// Run a plugin once: render, execute in a fresh workspace, collect results.
    Run(RunArgs),
    /// Answer a single evaluation for an outer tool that spawns the driver per evaluation.
    Driver(DriverArgs),
    /// Serve an outer tool through the file handshake until it signals stop.
    Couple(CoupleArgs),
    /// Inspect and manage the results database.
    Results(ResultsArgs),
}

/// Parameter sources shared by every command that renders templates.
#[derive(Args, Debug, Clone, Default)]
pub struct ParamArgs {
    /// TOML file of template parameters.
    #[arg(short = 'p', long, value_name = "PATH")]
    pub params: Option<PathBuf>,

    /// Set a single parameter, overriding the parameters file.
    /// Can be used multiple times. Example: -P radius=1.5
    #[arg(short = 'P', long = "param", value_name = "NAME=VALUE")]
    pub param_values: Vec<String>,
}

/// Arguments for the `render` subcommand.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the template file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub template: PathBuf,

    #[command(flatten)]
    pub params: ParamArgs,

    /// xsdir file enabling the `expand_element` filter.
    /// Defaults to `$SIMWEAVE_DATAPATH/xsdir` or `$DATAPATH/xsdir`.
    #[arg(long, value_name = "PATH")]
    pub xsdir: Option<PathBuf>,

    /// Write the rendered text here instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Plugin selection shared by `run`, `driver` and `couple`.
#[derive(Args, Debug, Clone, Default)]
pub struct PluginArgs {
    /// Plugin configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the plugin preset (generic, cyclus, mcnp).
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Override the template file.
    #[arg(short, long, value_name = "PATH")]
    pub template: Option<PathBuf>,

    /// Override the executable path or name.
    #[arg(short, long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// Override the execution timeout in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Keep the workspace directory after the run.
    #[arg(long)]
    pub retain: bool,

    /// Do not archive the run into the results database.
    #[arg(long)]
    pub no_archive: bool,

    /// Echo the executable's stdout while it runs.
    #[arg(long)]
    pub show_stdout: bool,

    #[command(flatten)]
    pub params: ParamArgs,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S plugin.timeout-secs=600
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE")]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub plugin: PluginArgs,
}

/// Arguments for the `driver` subcommand.
#[derive(Args, Debug)]
pub struct DriverArgs {
    #[command(flatten)]
    pub plugin: PluginArgs,

    /// Parameters file written by the outer tool.
    #[arg(required = true, value_name = "PARAMS_FILE")]
    pub params_file: PathBuf,

    /// Response file to write for the outer tool.
    #[arg(required = true, value_name = "RESPONSE_FILE")]
    pub response_file: PathBuf,
}

/// Arguments for the `couple` subcommand.
#[derive(Args, Debug)]
pub struct CoupleArgs {
    #[command(flatten)]
    pub plugin: PluginArgs,

    /// Directory shared with the outer tool for the handshake files.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub dir: PathBuf,

    /// Stop after this many iterations even if the outer tool continues.
    #[arg(long, value_name = "INT")]
    pub max_iterations: Option<usize>,
}

/// Arguments for the `results` subcommand.
#[derive(Args, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub command: ResultsCommands,
}

/// Available commands for results database management.
#[derive(Subcommand, Debug)]
pub enum ResultsCommands {
    /// Show the absolute path to the results database.
    Path,
    /// Set a custom absolute path for the results database.
    SetPath {
        /// The new directory to archive results into.
        #[arg(required = true)]
        path: PathBuf,
    },
    /// Reset the database path to its default, OS-specific location.
    ResetPath,
    /// List archived runs, oldest first.
    List,
    /// Show the stored results of one run.
    Show {
        /// Job id as printed by `run` or `results list`.
        #[arg(required = true)]
        job_id: String,
    },
}
