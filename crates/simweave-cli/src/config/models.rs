use simweave::core::params::Parameters;
use simweave::engine::config::PluginConfig;
use simweave::workflows::coupled::ResponseMap;
use std::path::PathBuf;
use std::time::Duration;

/// Fully merged settings for one CLI invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub plugin: PluginConfig,
    pub template: PathBuf,
    pub extra_templates: Vec<PathBuf>,
    /// Name of the rendered primary input; defaults to the template's name.
    pub input_name: Option<String>,
    pub postprocess: PostprocessSettings,
    pub coupling: CouplingSettings,
    pub base_parameters: Parameters,
    /// Nuclide index for `expand_element`, when the preset or config asks for it.
    pub xsdir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostprocessSettings {
    pub csv: bool,
    pub key_value_files: Vec<String>,
    pub conversion: Option<ConversionSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionSettings {
    pub directive: String,
    pub converter: PathBuf,
    pub binary_extension: String,
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct CouplingSettings {
    pub params_file: String,
    pub results_file: String,
    pub poll: Duration,
    pub timeout: Option<Duration>,
    pub max_iterations: Option<usize>,
    pub responses: ResponseMap,
}
