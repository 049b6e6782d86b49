use super::defaults::{self, DefaultsConfig, PRESETS, Preset};
use super::file::FileConfig;
use super::models::{AppConfig, ConversionSettings, CouplingSettings, PostprocessSettings};
use crate::cli::PluginArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use simweave::core::params::{Parameters, Value};
use simweave::engine::config::{Environment, ExecutableSpec, PluginConfigBuilder};
use simweave::engine::workspace::WorkspaceOptions;
use simweave::workflows::coupled::ResponseMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Merges command-line flags over the config file over the preset defaults.
/// Finished runs are archived under `archive_root` unless disabled.
pub fn build_config(
    args: &PluginArgs,
    env: &Environment,
    archive_root: Option<&Path>,
) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };

    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let preset_name = args
        .preset
        .clone()
        .or_else(|| file_config.preset.clone())
        .unwrap_or_else(|| defaults.preset.clone());
    let preset = defaults::preset(&preset_name).ok_or_else(|| {
        let known: Vec<_> = PRESETS.iter().map(|p| p.name).collect();
        CliError::Config(format!(
            "Unknown preset '{}'. Expected one of: {}.",
            preset_name,
            known.join(", ")
        ))
    })?;
    debug!("Using plugin preset '{}'.", preset.name);

    let plugin_file = file_config.plugin.take().unwrap_or_default();
    let workspace_file = file_config.workspace.take().unwrap_or_default();
    let post_file = file_config.postprocess.take().unwrap_or_default();
    let coupling_file = file_config.coupling.take().unwrap_or_default();
    let nuclide_file = file_config.nuclides.take().unwrap_or_default();

    let template = args
        .template
        .clone()
        .or_else(|| plugin_file.template.as_deref().map(|p| file_config.resolve(p)))
        .ok_or_else(|| {
            CliError::Config(
                "A template is required either in the config file (`plugin.template`) or via --template."
                    .to_string(),
            )
        })?;
    let extra_templates = plugin_file
        .extra_templates
        .unwrap_or_default()
        .iter()
        .map(|p| file_config.resolve(p))
        .collect();

    let explicit = args.executable.clone().or_else(|| {
        plugin_file
            .executable
            .as_deref()
            .map(|p| resolve_executable_path(&file_config, p))
    });
    let executable = executable_spec(preset, explicit, plugin_file.dir_var.as_deref())?;

    let workspace = WorkspaceOptions {
        root: workspace_file.root.as_deref().map(|p| file_config.resolve(p)),
        prefix: workspace_file
            .prefix
            .unwrap_or_else(|| defaults.workspace_prefix.clone()),
        retain: args.retain || workspace_file.retain.unwrap_or(false),
        enter: false,
    };

    let timeout_secs = args.timeout.or(plugin_file.timeout_secs);
    let mut builder = PluginConfigBuilder::new()
        .name(plugin_file.name.unwrap_or_else(|| preset.name.to_string()))
        .executable(executable)
        .args(
            plugin_file
                .args
                .unwrap_or_else(|| preset.args.iter().map(|a| a.to_string()).collect()),
        )
        .extra_inputs(
            plugin_file
                .extra_inputs
                .unwrap_or_default()
                .iter()
                .map(|p| file_config.resolve(p))
                .collect(),
        )
        .show_stdout(args.show_stdout || plugin_file.show_stdout.unwrap_or(false))
        .show_stderr(plugin_file.show_stderr.unwrap_or(defaults.show_stderr))
        .allow_nonzero_exit(plugin_file.allow_nonzero_exit.unwrap_or(false))
        .include_inputs(plugin_file.include_inputs.unwrap_or(false))
        .workspace(workspace);
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    for (key, value) in plugin_file.env.unwrap_or_default() {
        builder = builder.env_var(key, value);
    }
    let archive = !args.no_archive && workspace_file.archive.unwrap_or(defaults.archive);
    if let (true, Some(root)) = (archive, archive_root) {
        builder = builder.archive_dir(root);
    }
    let plugin = builder.build()?;

    let postprocess = PostprocessSettings {
        csv: post_file.csv.unwrap_or(defaults.csv),
        key_value_files: post_file.key_value_files.unwrap_or_default(),
        conversion: post_file.conversion.map(|c| ConversionSettings {
            directive: c.directive,
            converter: resolve_executable_path(&file_config, &c.converter),
            binary_extension: c.binary_extension,
            args: c.args,
        }),
    };

    let mut responses = ResponseMap::new();
    for (label, source) in coupling_file.responses.unwrap_or_default() {
        let source = parser::parse_response_source(&source)
            .map_err(|e| CliError::Config(format!("coupling.responses.{}: {}", label, e)))?;
        responses.insert(label, source);
    }
    let coupling = CouplingSettings {
        params_file: coupling_file
            .params_file
            .unwrap_or_else(|| defaults.params_file.clone()),
        results_file: coupling_file
            .results_file
            .unwrap_or_else(|| defaults.results_file.clone()),
        poll: Duration::from_millis(coupling_file.poll_ms.unwrap_or(defaults.poll_ms)),
        timeout: coupling_file.timeout_secs.map(Duration::from_secs),
        max_iterations: coupling_file.max_iterations,
        responses,
    };

    let xsdir = nuclide_file
        .xsdir
        .as_deref()
        .map(|p| file_config.resolve(p))
        .or_else(|| {
            if preset.expand_elements {
                env.xsdir_path()
            } else {
                None
            }
        });
    if preset.expand_elements && xsdir.is_none() {
        warn!(
            "Preset '{}' supports expand_element but no xsdir is configured; set `nuclides.xsdir` or SIMWEAVE_DATAPATH.",
            preset.name
        );
    }

    Ok(AppConfig {
        plugin,
        template,
        extra_templates,
        input_name: plugin_file.input_name,
        postprocess,
        coupling,
        base_parameters: file_config.parameters.take().unwrap_or_default(),
        xsdir,
    })
}

fn executable_spec(
    preset: &Preset,
    explicit: Option<PathBuf>,
    dir_var: Option<&str>,
) -> Result<ExecutableSpec> {
    let default_name = match (preset.executable, &explicit) {
        (Some(name), _) => name.to_string(),
        (None, Some(path)) => path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        (None, None) => {
            return Err(CliError::Config(format!(
                "Preset '{}' has no default executable; set `plugin.executable` or pass --executable.",
                preset.name
            )));
        }
    };
    let mut spec = ExecutableSpec::named(default_name);
    if let Some(var) = dir_var.or(preset.dir_var) {
        spec = spec.with_dir_var(var);
    }
    if let Some(path) = explicit {
        spec = spec.with_explicit(path);
    }
    Ok(spec)
}

/// Bare names are left for the PATH search; anything with a separator is a
/// path relative to the config file.
fn resolve_executable_path(file_config: &FileConfig, path: &Path) -> PathBuf {
    if path.components().count() > 1 {
        file_config.resolve(path)
    } else {
        path.to_path_buf()
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let (key, value_str) = parser::parse_assignment(kv_pair).map_err(|_| {
            CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            ))
        })?;

        if let Some(name) = key.strip_prefix("parameters.") {
            config
                .parameters
                .get_or_insert_with(Parameters::new)
                .set(name, Value::parse_scalar(value_str));
            continue;
        }
        if let Some(label) = key.strip_prefix("coupling.responses.") {
            config
                .coupling
                .get_or_insert_with(Default::default)
                .responses
                .get_or_insert_with(Default::default)
                .insert(label.to_string(), value_str.to_string());
            continue;
        }

        match key {
            "preset" => config.preset = Some(value_str.to_string()),
            "plugin.name" => {
                config.plugin.get_or_insert_with(Default::default).name =
                    Some(value_str.to_string());
            }
            "plugin.template" => {
                config.plugin.get_or_insert_with(Default::default).template =
                    Some(PathBuf::from(value_str));
            }
            "plugin.input-name" => {
                config.plugin.get_or_insert_with(Default::default).input_name =
                    Some(value_str.to_string());
            }
            "plugin.executable" => {
                config.plugin.get_or_insert_with(Default::default).executable =
                    Some(PathBuf::from(value_str));
            }
            "plugin.dir-var" => {
                config.plugin.get_or_insert_with(Default::default).dir_var =
                    Some(value_str.to_string());
            }
            "plugin.timeout-secs" => {
                config.plugin.get_or_insert_with(Default::default).timeout_secs =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "plugin.show-stdout" => {
                config.plugin.get_or_insert_with(Default::default).show_stdout =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "plugin.show-stderr" => {
                config.plugin.get_or_insert_with(Default::default).show_stderr =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "plugin.allow-nonzero-exit" => {
                config
                    .plugin
                    .get_or_insert_with(Default::default)
                    .allow_nonzero_exit = Some(parse_value(key, value_str, "boolean")?);
            }
            "plugin.include-inputs" => {
                config.plugin.get_or_insert_with(Default::default).include_inputs =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "workspace.root" => {
                config.workspace.get_or_insert_with(Default::default).root =
                    Some(PathBuf::from(value_str));
            }
            "workspace.prefix" => {
                config.workspace.get_or_insert_with(Default::default).prefix =
                    Some(value_str.to_string());
            }
            "workspace.retain" => {
                config.workspace.get_or_insert_with(Default::default).retain =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "workspace.archive" => {
                config.workspace.get_or_insert_with(Default::default).archive =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "postprocess.csv" => {
                config.postprocess.get_or_insert_with(Default::default).csv =
                    Some(parse_value(key, value_str, "boolean")?);
            }
            "coupling.params-file" => {
                config.coupling.get_or_insert_with(Default::default).params_file =
                    Some(value_str.to_string());
            }
            "coupling.results-file" => {
                config.coupling.get_or_insert_with(Default::default).results_file =
                    Some(value_str.to_string());
            }
            "coupling.poll-ms" => {
                config.coupling.get_or_insert_with(Default::default).poll_ms =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "coupling.timeout-secs" => {
                config.coupling.get_or_insert_with(Default::default).timeout_secs =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "coupling.max-iterations" => {
                config.coupling.get_or_insert_with(Default::default).max_iterations =
                    Some(parse_value(key, value_str, "integer")?);
            }
            "nuclides.xsdir" => {
                config.nuclides.get_or_insert_with(Default::default).xsdir =
                    Some(PathBuf::from(value_str));
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    fn plugin_args(argv: &[&str]) -> PluginArgs {
        let mut full = vec!["simweave", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Run(args) => args.plugin,
            other => panic!("expected run, got {:?}", other),
        }
    }

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("plugin.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn preset_supplies_command_and_executable_defaults() {
        let dir = tempdir().unwrap();
        let config = write_config(
            dir.path(),
            "preset = \"cyclus\"\n[plugin]\ntemplate = \"input.xml\"\n",
        );
        let args = plugin_args(&["-c", config.to_str().unwrap()]);

        let app = build_config(&args, &Environment::default(), None).unwrap();
        assert_eq!(app.plugin.name, "cyclus");
        assert_eq!(app.plugin.args, vec!["{input}", "-o", "{stem}.sqlite"]);
        assert_eq!(app.plugin.executable.default_name, "cyclus");
        assert_eq!(app.plugin.executable.dir_var.as_deref(), Some("CYCLUS_DIR"));
        assert_eq!(app.template, dir.path().join("input.xml"));
        assert!(app.plugin.archive_dir.is_none());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempdir().unwrap();
        let config = write_config(
            dir.path(),
            r#"
            [plugin]
            template = "deck.inp"
            executable = "/bin/sh"
            timeout-secs = 100

            [workspace]
            retain = false
            "#,
        );
        let args = plugin_args(&[
            "-c",
            config.to_str().unwrap(),
            "--timeout",
            "5",
            "--retain",
            "-t",
            "/other/deck.inp",
        ]);

        let app = build_config(&args, &Environment::default(), Some(Path::new("/db"))).unwrap();
        assert_eq!(app.plugin.timeout, Some(Duration::from_secs(5)));
        assert!(app.plugin.workspace.retain);
        assert_eq!(app.template, PathBuf::from("/other/deck.inp"));
        assert_eq!(app.plugin.executable.explicit, Some(PathBuf::from("/bin/sh")));
        assert_eq!(app.plugin.archive_dir, Some(PathBuf::from("/db")));
    }

    #[test]
    fn no_archive_flag_disables_archiving() {
        let args = plugin_args(&["-t", "deck.inp", "-e", "/bin/sh", "--no-archive"]);
        let app = build_config(&args, &Environment::default(), Some(Path::new("/db"))).unwrap();
        assert!(app.plugin.archive_dir.is_none());
    }

    #[test]
    fn set_values_reach_every_section() {
        let args = plugin_args(&[
            "-t",
            "deck.inp",
            "-e",
            "/bin/sh",
            "-S",
            "plugin.timeout-secs=7",
            "-S",
            "parameters.radius=2.5",
            "-S",
            "coupling.responses.obj_fn=param:radius",
            "-S",
            "coupling.max-iterations=4",
        ]);

        let app = build_config(&args, &Environment::default(), None).unwrap();
        assert_eq!(app.plugin.timeout, Some(Duration::from_secs(7)));
        assert_eq!(app.base_parameters.get("radius"), Some(&Value::Float(2.5)));
        assert_eq!(app.coupling.max_iterations, Some(4));

        let results = simweave::core::results::Results {
            location: PathBuf::new(),
            inputs: vec![],
            outputs: vec![],
            postprocess_error: None,
            exec_info: simweave::core::results::ExecInfo {
                job_id: "j".into(),
                plugin_name: "generic".into(),
                timestamp: chrono::Utc::now(),
                duration_secs: 0.0,
                exit_code: Some(0),
            },
            parameters: app.base_parameters.clone(),
            data: Default::default(),
        };
        let values = app
            .coupling
            .responses
            .extract(&["obj_fn".to_string()], &results)
            .unwrap();
        assert_eq!(values, vec![("obj_fn".to_string(), 2.5)]);
    }

    #[test]
    fn invalid_inputs_are_reported() {
        let unsupported = plugin_args(&["-t", "d", "-e", "/bin/sh", "-S", "plugin.colour=red"]);
        assert!(matches!(
            build_config(&unsupported, &Environment::default(), None),
            Err(CliError::Config(_))
        ));

        let bad_int = plugin_args(&["-t", "d", "-e", "/bin/sh", "-S", "plugin.timeout-secs=soon"]);
        assert!(matches!(
            build_config(&bad_int, &Environment::default(), None),
            Err(CliError::Config(_))
        ));

        let no_exe = plugin_args(&["-t", "d"]);
        assert!(matches!(
            build_config(&no_exe, &Environment::default(), None),
            Err(CliError::Config(_))
        ));

        let no_template = plugin_args(&["-e", "/bin/sh"]);
        assert!(matches!(
            build_config(&no_template, &Environment::default(), None),
            Err(CliError::Config(_))
        ));

        let bad_preset = plugin_args(&["-t", "d", "--preset", "openmc"]);
        assert!(matches!(
            build_config(&bad_preset, &Environment::default(), None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn mcnp_preset_picks_xsdir_from_environment() {
        let args = plugin_args(&["-t", "deck.inp", "--preset", "mcnp"]);
        let env = Environment::from_vars([("DATAPATH", "/data/mcnp")]);
        let app = build_config(&args, &env, None).unwrap();
        assert_eq!(app.xsdir, Some(PathBuf::from("/data/mcnp/xsdir")));
        assert_eq!(app.plugin.args, vec!["i={input}"]);
    }
}
