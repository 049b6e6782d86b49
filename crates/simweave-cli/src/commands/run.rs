use crate::cli::RunArgs;
use crate::commands::{prepare, results::print_summary};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use simweave::engine::progress::ProgressReporter;
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let (app, plugin, params) = prepare(&args.plugin)?;
    info!(
        plugin = %plugin.name(),
        template = %app.template.display(),
        "Running plugin."
    );

    let handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    let results = plugin.run_with_reporter(&params, &reporter)?;

    print_summary(&results);
    Ok(())
}
