mod cli;
mod commands;
mod config;
mod database;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use clap::Parser;
use tracing::{debug, error, info};

fn main() {
    if let Err(e) = run_app() {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("{}", info);
        default_hook(info);
    }));

    info!("🚀 SimWeave CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = match cli.command {
        Commands::Render(args) => {
            info!("Dispatching to 'render' command.");
            commands::render::run(args)
        }
        Commands::Run(args) => {
            info!("Dispatching to 'run' command.");
            commands::run::run(args)
        }
        Commands::Driver(args) => {
            info!("Dispatching to 'driver' command.");
            commands::driver::run(args)
        }
        Commands::Couple(args) => {
            info!("Dispatching to 'couple' command.");
            commands::couple::run(args)
        }
        Commands::Results(args) => {
            info!("Dispatching to 'results' command.");
            commands::results::run(args)
        }
    };

    match &command_result {
        Ok(_) => info!("✅ Command completed successfully."),
        Err(e) => error!("❌ Command failed: {}", e),
    }

    command_result
}
