use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::config::ConfigError;
use super::process::ProcessError;
use super::state::StateError;
use super::workspace::WorkspaceError;
use crate::core::results::ResultsError;
use crate::core::template::TemplateError;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Invalid plugin configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Template rendering failed: {0}")]
    Template(#[from] TemplateError),

    #[error("Renderer produced no input files")]
    NoInput,

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Executable '{name}' not found")]
    ExecutableNotFound { name: String },

    #[error("Failed to launch '{executable}': {source}")]
    ProcessLaunch {
        executable: PathBuf,
        source: std::io::Error,
    },

    #[error("Process exceeded timeout of {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Lost track of '{executable}' while it was running: {source}")]
    ProcessWait {
        executable: PathBuf,
        source: std::io::Error,
    },

    /// `stderr` holds the bytes exactly as the process wrote them.
    #[error("Process exited with code {code:?}: {}", String::from_utf8_lossy(.stderr).trim_end())]
    NonZeroExit { code: Option<i32>, stderr: Vec<u8> },

    #[error("Failed to archive results to '{path}': {source}")]
    Archive {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to persist results: {0}")]
    Results(#[from] ResultsError),

    #[error("Internal state error: {0}")]
    State(#[from] StateError),
}

impl From<ProcessError> for PluginError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::ExecutableNotFound { name, .. } => Self::ExecutableNotFound { name },
            ProcessError::Launch { executable, source } => {
                Self::ProcessLaunch { executable, source }
            }
            ProcessError::Wait { executable, source } => Self::ProcessWait { executable, source },
            ProcessError::Timeout { timeout, .. } => Self::Timeout { timeout },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn wait_failure_is_not_reported_as_launch_failure() {
        let wait = ProcessError::Wait {
            executable: PathBuf::from("/bin/sim"),
            source: io::Error::other("interrupted"),
        };
        assert!(matches!(PluginError::from(wait), PluginError::ProcessWait { .. }));

        let launch = ProcessError::Launch {
            executable: PathBuf::from("/bin/sim"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(matches!(PluginError::from(launch), PluginError::ProcessLaunch { .. }));
    }

    #[test]
    fn non_zero_exit_message_shows_stderr_lossily() {
        let err = PluginError::NonZeroExit {
            code: Some(1),
            stderr: vec![0xff, b'b', b'a', b'd', b'\n'],
        };
        assert_eq!(err.to_string(), "Process exited with code Some(1): \u{fffd}bad");
    }
}
