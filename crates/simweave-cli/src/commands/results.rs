use crate::cli::{ResultsArgs, ResultsCommands};
use crate::database::ResultsDatabase;
use crate::error::{CliError, Result};
use simweave::core::results::Results;
use tracing::info;

pub fn run(args: ResultsArgs) -> Result<()> {
    match args.command {
        ResultsCommands::Path => {
            let db = ResultsDatabase::new()?;
            println!("{}", db.path().display());
        }
        ResultsCommands::SetPath { path } => {
            if !path.is_absolute() {
                return Err(CliError::Argument(format!(
                    "Results path must be absolute, got {:?}.",
                    path
                )));
            }
            ResultsDatabase::set_custom_path(&path)?;
            info!("Results database path set to {:?}", path);
            println!("Results database path set to {}", path.display());
        }
        ResultsCommands::ResetPath => {
            ResultsDatabase::reset_path()?;
            let db = ResultsDatabase::new()?;
            println!("Results database path reset to {}", db.path().display());
        }
        ResultsCommands::List => {
            let db = ResultsDatabase::new()?;
            let jobs = db.list()?;
            if jobs.is_empty() {
                println!("No archived runs in {}", db.path().display());
            }
            for job in jobs {
                let exit = job
                    .exit_code
                    .map_or_else(|| "-".to_string(), |code| code.to_string());
                let flag = if job.postprocess_error { "  (postprocess error)" } else { "" };
                println!(
                    "{}  {}  {}  exit={}{}",
                    job.job_id, job.plugin_name, job.timestamp, exit, flag
                );
            }
        }
        ResultsCommands::Show { job_id } => {
            let results = ResultsDatabase::new()?.load(&job_id)?;
            let text = toml::to_string_pretty(&results)
                .map_err(|e| CliError::Database(format!("Cannot display '{}': {}", job_id, e)))?;
            print!("{}", text);
        }
    }
    Ok(())
}

/// Short report printed after a run.
pub(crate) fn print_summary(results: &Results) {
    println!("Job {} ({})", results.job_id(), results.exec_info.plugin_name);
    println!("  Location: {}", results.location.display());
    println!("  Duration: {:.2}s", results.exec_info.duration_secs);
    if !results.outputs.is_empty() {
        println!("  Outputs:  {}", results.outputs.join(", "));
    }
    if let Some(error) = &results.postprocess_error {
        println!("  Postprocessing failed: {}", error);
    }
}
