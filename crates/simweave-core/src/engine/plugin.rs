use super::collector::{Collector, Postprocess};
use super::config::{CommandContext, Environment, PluginConfig, expand_args};
use super::error::PluginError;
use super::process::{self, ExecutionRequest, resolve_executable};
use super::progress::ProgressReporter;
use super::state::{Invocation, PluginState};
use super::workspace::{Workspace, copy_tree};
use crate::core::params::Parameters;
use crate::core::results::{ExecInfo, RESULTS_FILE_NAME, Results};
use crate::core::template::{
    Filters, RenderedInput, Template, TemplateError, TemplateRenderer,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// How a plugin variant turns parameters into input files. The first input
/// returned is the primary one passed to the executable.
pub trait Render: Send + Sync {
    fn render(&self, params: &Parameters) -> Result<Vec<RenderedInput>, TemplateError>;
}

/// Renders Jinja text templates, optionally with extra templated inputs.
#[derive(Debug, Clone)]
pub struct TemplateRender {
    renderer: TemplateRenderer,
    primary: (Template, String),
    extras: Vec<(Template, String)>,
}

impl TemplateRender {
    /// The rendered file keeps the template's name.
    pub fn new(template: Template) -> Self {
        let file_name = template.name().to_string();
        Self {
            renderer: TemplateRenderer::default(),
            primary: (template, file_name),
            extras: Vec::new(),
        }
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.primary.1 = file_name.into();
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.renderer = TemplateRenderer::new(filters);
        self
    }

    pub fn extra_template(mut self, template: Template) -> Self {
        let file_name = template.name().to_string();
        self.extras.push((template, file_name));
        self
    }
}

impl Render for TemplateRender {
    fn render(&self, params: &Parameters) -> Result<Vec<RenderedInput>, TemplateError> {
        std::iter::once(&self.primary)
            .chain(&self.extras)
            .map(|(template, file_name)| {
                self.renderer
                    .render_input(template, params, file_name.clone())
            })
            .collect()
    }
}

type Generator = Box<dyn Fn(&Parameters) -> Result<String, TemplateError> + Send + Sync>;

/// Builds the input file programmatically instead of from a text template.
pub struct GeneratedRender {
    file_name: String,
    generate: Generator,
}

impl GeneratedRender {
    pub fn new<F>(file_name: impl Into<String>, generate: F) -> Self
    where
        F: Fn(&Parameters) -> Result<String, TemplateError> + Send + Sync + 'static,
    {
        Self {
            file_name: file_name.into(),
            generate: Box::new(generate),
        }
    }
}

impl Render for GeneratedRender {
    fn render(&self, params: &Parameters) -> Result<Vec<RenderedInput>, TemplateError> {
        Ok(vec![RenderedInput::new(
            self.file_name.clone(),
            (self.generate)(params)?,
        )])
    }
}

/// One external code wrapped in the shared render → stage → execute →
/// collect pipeline.
///
/// Only rendering and postprocessing vary between codes; both are supplied
/// as capabilities. The executable is resolved once, at construction.
pub struct Plugin {
    config: PluginConfig,
    executable: PathBuf,
    renderer: Box<dyn Render>,
    collector: Collector,
}

impl Plugin {
    pub fn new(
        config: PluginConfig,
        env: &Environment,
        renderer: impl Render + 'static,
    ) -> Result<Self, PluginError> {
        let executable = resolve_executable(&config.executable, env)?;
        info!(
            plugin = %config.name,
            executable = %executable.display(),
            "Resolved plugin executable."
        );
        let collector = Collector::new(config.include_inputs);
        Ok(Self {
            config,
            executable,
            renderer: Box::new(renderer),
            collector,
        })
    }

    pub fn with_postprocessor(mut self, postprocessor: impl Postprocess + 'static) -> Self {
        self.collector.push(Box::new(postprocessor));
        self
    }

    pub fn add_postprocessor(&mut self, postprocessor: Box<dyn Postprocess>) {
        self.collector.push(postprocessor);
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn run(&self, params: &Parameters) -> Result<Results, PluginError> {
        self.run_with_reporter(params, &ProgressReporter::new())
    }

    /// Performs one full invocation. Every failure moves the invocation to
    /// `FAILED`; no Results exist for an invocation that did not execute.
    #[instrument(skip_all, name = "plugin_run", fields(plugin = %self.config.name))]
    pub fn run_with_reporter(
        &self,
        params: &Parameters,
        reporter: &ProgressReporter,
    ) -> Result<Results, PluginError> {
        let mut invocation = Invocation::new();
        match self.execute(params, &mut invocation, reporter) {
            Ok(results) => Ok(results),
            Err(e) => {
                if let Ok(from) = invocation.fail() {
                    self.report(reporter, from, PluginState::Failed);
                }
                warn!(error = %e, "Plugin invocation failed.");
                Err(e)
            }
        }
    }

    fn advance(
        &self,
        invocation: &mut Invocation,
        next: PluginState,
        reporter: &ProgressReporter,
    ) -> Result<(), PluginError> {
        let from = invocation.advance(next)?;
        self.report(reporter, from, next);
        Ok(())
    }

    fn report(&self, reporter: &ProgressReporter, from: PluginState, to: PluginState) {
        info!(state = %to, "Plugin state changed.");
        reporter.state_changed(&self.config.name, from, to);
    }

    fn execute(
        &self,
        params: &Parameters,
        invocation: &mut Invocation,
        reporter: &ProgressReporter,
    ) -> Result<Results, PluginError> {
        let inputs = self.renderer.render(params)?;
        let primary = inputs.first().ok_or(PluginError::NoInput)?.file_name.clone();
        self.advance(invocation, PluginState::TemplateRendered, reporter)?;

        let workspace = Workspace::create(&self.config.workspace)?;
        // Tracked order is primary input, other rendered inputs, staged files.
        let mut tracked: Vec<String> = inputs.iter().map(|i| i.file_name.clone()).collect();
        for extra in &self.config.extra_inputs {
            workspace.stage_file(extra)?;
            if let Some(name) = extra.file_name() {
                tracked.push(name.to_string_lossy().to_string());
            }
        }
        for input in &inputs {
            workspace.write_input(input)?;
        }
        self.advance(invocation, PluginState::WorkspaceReady, reporter)?;

        let job_id = workspace.name().to_string();
        let stem = Path::new(&primary)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| primary.clone());
        let executable = self.executable.to_string_lossy();
        let workspace_dir = workspace.path().to_string_lossy();
        let args = expand_args(
            &self.config.args,
            &CommandContext {
                executable: &executable,
                input: &primary,
                stem: &stem,
                workspace: &workspace_dir,
            },
        );
        let request = ExecutionRequest {
            program: self.executable.clone(),
            args,
            env: self.config.env.clone(),
            cwd: workspace.path().to_path_buf(),
            timeout: self.config.timeout,
            echo_stdout: self.config.show_stdout,
            echo_stderr: self.config.show_stderr,
        };

        self.advance(invocation, PluginState::Executing, reporter)?;
        let timestamp = Utc::now();
        let outcome = process::run(&request)?;
        info!(
            job_id = %job_id,
            exit_code = ?outcome.exit_code,
            duration_secs = outcome.duration.as_secs_f64(),
            "Executable finished."
        );
        if !outcome.success() && !self.config.allow_nonzero_exit {
            return Err(PluginError::NonZeroExit {
                code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }

        self.advance(invocation, PluginState::Postprocessing, reporter)?;
        let exec_info = ExecInfo {
            job_id: job_id.clone(),
            plugin_name: self.config.name.clone(),
            timestamp,
            duration_secs: outcome.duration.as_secs_f64(),
            exit_code: outcome.exit_code,
        };
        let mut results = self
            .collector
            .collect(workspace.path(), &tracked, params, exec_info)?;

        if let Some(archive_dir) = &self.config.archive_dir {
            results.location = self.archive(&workspace, archive_dir, &job_id, &results)?;
        }

        self.advance(invocation, PluginState::Done, reporter)?;
        Ok(results)
    }

    fn archive(
        &self,
        workspace: &Workspace,
        archive_dir: &Path,
        job_id: &str,
        results: &Results,
    ) -> Result<PathBuf, PluginError> {
        let target = archive_dir.join(job_id);
        copy_tree(workspace.path(), &target).map_err(|e| PluginError::Archive {
            path: target.to_string_lossy().to_string(),
            source: e,
        })?;
        let mut archived = results.clone();
        archived.location = target.clone();
        archived.save(&target.join(RESULTS_FILE_NAME))?;
        info!(path = %target.display(), "Archived results.");
        Ok(target)
    }
}
