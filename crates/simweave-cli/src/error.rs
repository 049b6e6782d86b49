use simweave::core::params::ParamsError;
use simweave::core::results::ResultsError;
use simweave::core::template::TemplateError;
use simweave::engine::config::ConfigError;
use simweave::engine::error::PluginError;
use simweave::workflows::coupled::{CoupledFailure, CouplingError};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Coupling(#[from] CouplingError),

    #[error(transparent)]
    CoupledRun(#[from] CoupledFailure),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Results database error: {0}")]
    Database(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<ParamsError> for CliError {
    fn from(err: ParamsError) -> Self {
        CliError::Other(err.into())
    }
}

impl From<ResultsError> for CliError {
    fn from(err: ResultsError) -> Self {
        CliError::Database(err.to_string())
    }
}
