pub mod couple;
pub mod driver;
pub mod render;
pub mod results;
pub mod run;

use crate::cli::{ParamArgs, PluginArgs};
use crate::config::{self, AppConfig};
use crate::database::ResultsDatabase;
use crate::error::{CliError, Result};
use crate::utils::parser;
use simweave::core::nuclide::NuclideIndex;
use simweave::core::params::Parameters;
use simweave::core::template::{Filters, Template};
use simweave::engine::config::Environment;
use simweave::engine::plugin::{Plugin, TemplateRender};
use simweave::engine::postprocess::{CsvTables, GatedConversion, KeyValueFile};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Layers `--params` and then `-P` overrides over `base`.
pub(crate) fn load_parameters(base: Parameters, args: &ParamArgs) -> Result<Parameters> {
    let mut params = base;
    if let Some(path) = &args.params {
        debug!("Loading parameters from {:?}", path);
        params.merge(&Parameters::load(path)?);
    }
    let overrides = parser::parse_param_overrides(&args.param_values)
        .map_err(|e| CliError::Argument(e.to_string()))?;
    params.merge(&overrides);
    Ok(params)
}

/// Filters for a render: `expand_element` when an xsdir is available.
pub(crate) fn build_filters(xsdir: Option<&Path>) -> Result<Filters> {
    let Some(path) = xsdir else {
        return Ok(Filters::new());
    };
    let index = NuclideIndex::load(path).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    info!("Loaded {} nuclides from {:?}", index.len(), path);
    Ok(Filters::new().with_expand_element(Arc::new(index)))
}

pub(crate) fn build_plugin(app: &AppConfig, env: &Environment) -> Result<Plugin> {
    let filters = build_filters(app.xsdir.as_deref())?;
    let mut render = TemplateRender::new(Template::load(&app.template)?).filters(filters);
    if let Some(name) = &app.input_name {
        render = render.file_name(name.clone());
    }
    for extra in &app.extra_templates {
        render = render.extra_template(Template::load(extra)?);
    }

    let mut plugin = Plugin::new(app.plugin.clone(), env, render)?;
    match &app.postprocess.conversion {
        Some(conversion) => {
            let mut gated = GatedConversion::new(
                conversion.directive.clone(),
                conversion.converter.clone(),
                conversion.binary_extension.clone(),
            );
            if let Some(args) = &conversion.args {
                gated = gated.with_converter_args(args.clone());
            }
            plugin.add_postprocessor(Box::new(gated));
        }
        None if app.postprocess.csv => plugin.add_postprocessor(Box::new(CsvTables)),
        None => {}
    }
    for file in &app.postprocess.key_value_files {
        plugin.add_postprocessor(Box::new(KeyValueFile::new(file.clone())));
    }
    Ok(plugin)
}

/// Everything `run`, `driver` and `couple` need before the first invocation.
pub(crate) fn prepare(args: &PluginArgs) -> Result<(AppConfig, Plugin, Parameters)> {
    let env = Environment::capture();
    let database = if args.no_archive {
        None
    } else {
        Some(ResultsDatabase::new()?)
    };
    let app = config::build_config(args, &env, database.as_ref().map(|db| db.path()))?;
    let params = load_parameters(app.base_parameters.clone(), &args.params)?;
    let plugin = build_plugin(&app, &env)?;
    debug!("Parameters:\n{}", params.summary());
    Ok((app, plugin, params))
}
