use crate::cli::DriverArgs;
use crate::commands::prepare;
use crate::error::Result;
use simweave::workflows::coupled::driver_step;
use tracing::info;

/// One evaluation for an outer tool that launches the driver per evaluation.
pub fn run(args: DriverArgs) -> Result<()> {
    let (app, plugin, params) = prepare(&args.plugin)?;
    let results = driver_step(
        &plugin,
        &args.params_file,
        &args.response_file,
        &app.coupling.responses,
        &params,
    )?;
    info!(
        job_id = %results.job_id(),
        response = %args.response_file.display(),
        "Evaluation answered."
    );
    Ok(())
}
