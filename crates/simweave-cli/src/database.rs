use crate::error::{CliError, Result};
use directories::ProjectDirs;
use simweave::core::results::{RESULTS_FILE_NAME, Results};
use std::fs::{self};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One archived run, as listed by `results list`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub job_id: String,
    pub plugin_name: String,
    pub timestamp: String,
    pub exit_code: Option<i32>,
    pub postprocess_error: bool,
}

/// The directory tree where finished runs are archived, one `<job_id>/`
/// directory per run holding its files and `results.toml`.
#[derive(Debug)]
pub struct ResultsDatabase {
    base_path: PathBuf,
}

impl ResultsDatabase {
    pub fn new() -> Result<Self> {
        let path = Self::determine_database_path()?;
        debug!("ResultsDatabase initialized with path: {:?}", &path);
        Ok(Self { base_path: path })
    }

    pub fn with_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.base_path
    }

    pub fn set_custom_path(path: &Path) -> Result<()> {
        let config_path = Self::get_path_config_file()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(config_path, path.to_string_lossy().as_bytes()).map_err(CliError::from)
    }

    pub fn reset_path() -> Result<()> {
        if let Ok(config_path) = Self::get_path_config_file() {
            if config_path.exists() {
                fs::remove_file(config_path)?;
            }
        }
        Ok(())
    }

    /// Every readable archived run, oldest first. Directories without a
    /// readable `results.toml` are skipped with a warning.
    pub fn list(&self) -> Result<Vec<JobSummary>> {
        if !self.base_path.exists() {
            return Ok(Vec::new());
        }
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            let results_file = entry.path().join(RESULTS_FILE_NAME);
            if !results_file.is_file() {
                continue;
            }
            match Results::load(&results_file) {
                Ok(results) => jobs.push((results.exec_info.timestamp, JobSummary {
                    job_id: results.exec_info.job_id.clone(),
                    plugin_name: results.exec_info.plugin_name.clone(),
                    timestamp: results.exec_info.timestamp.to_rfc3339(),
                    exit_code: results.exec_info.exit_code,
                    postprocess_error: results.has_postprocess_error(),
                })),
                Err(e) => warn!("Skipping unreadable results in {:?}: {}", entry.path(), e),
            }
        }
        jobs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.job_id.cmp(&b.1.job_id)));
        Ok(jobs.into_iter().map(|(_, job)| job).collect())
    }

    pub fn load(&self, job_id: &str) -> Result<Results> {
        if job_id.contains(['/', '\\']) || job_id.starts_with('.') {
            return Err(CliError::Argument(format!("Invalid job id '{}'.", job_id)));
        }
        let results_file = self.base_path.join(job_id).join(RESULTS_FILE_NAME);
        if !results_file.is_file() {
            return Err(CliError::Database(format!(
                "No archived run '{}' in {:?}.",
                job_id, self.base_path
            )));
        }
        Ok(Results::load(&results_file)?)
    }

    fn determine_database_path() -> Result<PathBuf> {
        match Self::get_path_config_file() {
            Ok(config_path) if config_path.exists() => {
                let custom_path_str = fs::read_to_string(&config_path)?.trim().to_string();
                if custom_path_str.is_empty() {
                    warn!("Custom path config file is empty, falling back to default path.");
                    Self::get_default_database_path()
                } else {
                    Ok(PathBuf::from(custom_path_str))
                }
            }
            _ => Self::get_default_database_path(),
        }
    }

    fn get_path_config_file() -> Result<PathBuf> {
        ProjectDirs::from("org", "simweave", "simweave")
            .map(|dirs| dirs.config_dir().join("results-path.conf"))
            .ok_or_else(|| {
                CliError::Database("Could not determine config directory path.".to_string())
            })
    }

    fn get_default_database_path() -> Result<PathBuf> {
        ProjectDirs::from("org", "simweave", "simweave")
            .map(|dirs| dirs.data_dir().join("results"))
            .ok_or_else(|| {
                CliError::Database("Could not determine default data directory path.".to_string())
            })
    }
}
