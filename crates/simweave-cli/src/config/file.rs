use crate::error::{CliError, Result};
use serde::Deserialize;
use simweave::core::params::Parameters;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub preset: Option<String>,
    pub plugin: Option<FilePluginConfig>,
    pub workspace: Option<FileWorkspaceConfig>,
    pub postprocess: Option<FilePostprocessConfig>,
    pub coupling: Option<FileCouplingConfig>,
    pub nuclides: Option<FileNuclideConfig>,
    /// Base parameters every invocation starts from.
    pub parameters: Option<Parameters>,

    /// Directory of the file itself; relative paths are resolved against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePluginConfig {
    pub name: Option<String>,
    pub template: Option<PathBuf>,
    pub extra_templates: Option<Vec<PathBuf>>,
    pub input_name: Option<String>,
    pub executable: Option<PathBuf>,
    pub dir_var: Option<String>,
    pub args: Option<Vec<String>>,
    pub extra_inputs: Option<Vec<PathBuf>>,
    pub env: Option<BTreeMap<String, String>>,
    pub timeout_secs: Option<u64>,
    pub show_stdout: Option<bool>,
    pub show_stderr: Option<bool>,
    pub allow_nonzero_exit: Option<bool>,
    pub include_inputs: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileWorkspaceConfig {
    pub root: Option<PathBuf>,
    pub prefix: Option<String>,
    pub retain: Option<bool>,
    /// Archive finished runs into the results database.
    pub archive: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FilePostprocessConfig {
    pub csv: Option<bool>,
    pub key_value_files: Option<Vec<String>>,
    pub conversion: Option<FileConversionConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConversionConfig {
    pub directive: String,
    pub converter: PathBuf,
    pub binary_extension: String,
    pub args: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileCouplingConfig {
    pub params_file: Option<String>,
    pub results_file: Option<String>,
    pub poll_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_iterations: Option<usize>,
    /// Response label to `data:<path>` or `param:<name>`.
    pub responses: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileNuclideConfig {
    pub xsdir: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Resolves `path` against the directory of the config file.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() && !base.as_os_str().is_empty() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}
