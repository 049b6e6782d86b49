use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self},
    prelude::*,
};

/// Maps `-q` / `-v` counts to the console level. Child process output is
/// echoed separately, so the default stays at warnings.
pub fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(level_filter(verbosity, quiet));

    let subscriber = tracing_subscriber::registry().with(stderr_layer);

    if let Some(path) = log_file {
        let file = File::create(path)?;

        // The log file always records the full run, independent of -q/-v.
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_ids(true)
            .with_target(true)
            .with_filter(LevelFilter::DEBUG);

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}
