use crate::cli::CoupleArgs;
use crate::commands::prepare;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use simweave::engine::progress::ProgressReporter;
use simweave::workflows::coupled::CoupledWorkflow;
use simweave::workflows::handshake::FileChannel;
use tracing::{info, warn};

pub fn run(args: CoupleArgs) -> Result<()> {
    let (app, plugin, params) = prepare(&args.plugin)?;
    let coupling = &app.coupling;

    let channel = FileChannel::new(&args.dir)
        .file_names(coupling.params_file.clone(), coupling.results_file.clone())
        .poll_interval(coupling.poll)
        .timeout(coupling.timeout);
    info!(
        params = %channel.params_path().display(),
        results = %channel.results_path().display(),
        "Waiting for the outer tool."
    );

    let mut workflow = CoupledWorkflow::new(&plugin, channel)
        .responses(coupling.responses.clone())
        .base_parameters(params);
    if let Some(max) = args.max_iterations.or(coupling.max_iterations) {
        workflow = workflow.max_iterations(max);
    }

    let handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    match workflow.run_with_reporter(&reporter) {
        Ok(results) => {
            println!("Coupled run finished after {} iteration(s).", results.len());
            if let Some(last) = results.final_results() {
                println!("  Final job: {}", last.job_id());
                println!("  Location:  {}", last.location.display());
            }
            Ok(())
        }
        Err(failure) => {
            warn!(
                completed = failure.completed.len(),
                "Coupled run stopped on error."
            );
            for results in failure.completed.iterations() {
                println!("  Completed: {}", results.job_id());
            }
            Err(failure.into())
        }
    }
}
