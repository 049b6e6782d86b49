use super::workspace::WorkspaceOptions;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Placeholders recognized in a plugin's argument template.
pub const PLACEHOLDERS: [&str; 4] = ["executable", "input", "stem", "workspace"];

/// Variables consulted, in order, to locate the nuclide-data directory.
pub const DATAPATH_VARS: [&str; 2] = ["SIMWEAVE_DATAPATH", "DATAPATH"];

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// An immutable snapshot of the environment variables the engine consults.
///
/// Captured once and threaded through construction; nothing downstream reads
/// the process environment directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Directories listed in `PATH`, in search order.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.get("PATH")
            .map(|p| std::env::split_paths(&OsString::from(p)).collect())
            .unwrap_or_default()
    }

    /// Location of the `xsdir` nuclide index, if a data path is configured.
    pub fn xsdir_path(&self) -> Option<PathBuf> {
        DATAPATH_VARS
            .iter()
            .find_map(|var| self.get(var))
            .map(|dir| PathBuf::from(dir).join("xsdir"))
    }
}

/// How a plugin finds its executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableSpec {
    /// An explicit path or name given by the user; takes precedence.
    pub explicit: Option<PathBuf>,
    /// Name looked up under `dir_var` and then on `PATH`.
    pub default_name: String,
    /// Variable naming the directory that holds the executable (`*_DIR`).
    pub dir_var: Option<String>,
}

impl ExecutableSpec {
    pub fn named(default_name: impl Into<String>) -> Self {
        Self {
            explicit: None,
            default_name: default_name.into(),
            dir_var: None,
        }
    }

    pub fn with_dir_var(mut self, var: impl Into<String>) -> Self {
        self.dir_var = Some(var.into());
        self
    }

    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }
}

/// Every option a plugin invocation recognizes.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConfig {
    pub name: String,
    pub executable: ExecutableSpec,
    /// Argument template; see [`PLACEHOLDERS`].
    pub args: Vec<String>,
    /// Raw files copied into the workspace before execution.
    pub extra_inputs: Vec<PathBuf>,
    /// Environment overrides for the child process.
    pub env: BTreeMap<String, String>,
    pub show_stdout: bool,
    pub show_stderr: bool,
    pub timeout: Option<Duration>,
    /// Treat a non-zero exit code as success.
    pub allow_nonzero_exit: bool,
    /// List rendered inputs among the collected outputs.
    pub include_inputs: bool,
    pub workspace: WorkspaceOptions,
    /// Copy finished workspaces into `<archive_dir>/<job_id>`.
    pub archive_dir: Option<PathBuf>,
}

#[derive(Default)]
pub struct PluginConfigBuilder {
    name: Option<String>,
    executable: Option<ExecutableSpec>,
    args: Option<Vec<String>>,
    extra_inputs: Vec<PathBuf>,
    env: BTreeMap<String, String>,
    show_stdout: bool,
    show_stderr: bool,
    timeout: Option<Duration>,
    allow_nonzero_exit: bool,
    include_inputs: bool,
    workspace: WorkspaceOptions,
    archive_dir: Option<PathBuf>,
}

impl PluginConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn executable(mut self, spec: ExecutableSpec) -> Self {
        self.executable = Some(spec);
        self
    }
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }
    pub fn extra_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_inputs.push(path.into());
        self
    }
    pub fn extra_inputs(mut self, paths: Vec<PathBuf>) -> Self {
        self.extra_inputs.extend(paths);
        self
    }
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
    pub fn show_stdout(mut self, show: bool) -> Self {
        self.show_stdout = show;
        self
    }
    pub fn show_stderr(mut self, show: bool) -> Self {
        self.show_stderr = show;
        self
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn allow_nonzero_exit(mut self, allow: bool) -> Self {
        self.allow_nonzero_exit = allow;
        self
    }
    pub fn include_inputs(mut self, include: bool) -> Self {
        self.include_inputs = include;
        self
    }
    pub fn workspace(mut self, options: WorkspaceOptions) -> Self {
        self.workspace = options;
        self
    }
    pub fn retain_workspace(mut self, retain: bool) -> Self {
        self.workspace.retain = retain;
        self
    }
    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<PluginConfig, ConfigError> {
        let name = self.name.ok_or(ConfigError::MissingParameter("name"))?;
        if name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "name",
                reason: "must not be empty".into(),
            });
        }
        let executable = self
            .executable
            .ok_or(ConfigError::MissingParameter("executable"))?;
        if executable.explicit.is_none() && executable.default_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "executable",
                reason: "needs an explicit path or a default name".into(),
            });
        }
        let args = self.args.unwrap_or_else(|| vec!["{input}".to_string()]);
        for arg in &args {
            validate_placeholders(arg)?;
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be greater than zero".into(),
            });
        }
        if self.workspace.prefix.is_empty() || self.workspace.prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                field: "workspace.prefix",
                reason: format!("'{}' is not a valid directory prefix", self.workspace.prefix),
            });
        }

        Ok(PluginConfig {
            name,
            executable,
            args,
            extra_inputs: self.extra_inputs,
            env: self.env,
            show_stdout: self.show_stdout,
            show_stderr: self.show_stderr,
            timeout: self.timeout,
            allow_nonzero_exit: self.allow_nonzero_exit,
            include_inputs: self.include_inputs,
            workspace: self.workspace,
            archive_dir: self.archive_dir,
        })
    }
}

fn validate_placeholders(arg: &str) -> Result<(), ConfigError> {
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| ConfigError::Invalid {
            field: "args",
            reason: format!("unterminated placeholder in '{}'", arg),
        })?;
        let key = &after[..close];
        if !PLACEHOLDERS.contains(&key) {
            return Err(ConfigError::Invalid {
                field: "args",
                reason: format!("unknown placeholder '{{{}}}' in '{}'", key, arg),
            });
        }
        rest = &after[close + 1..];
    }
    Ok(())
}

/// Values substituted into an argument template.
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub executable: &'a str,
    pub input: &'a str,
    pub stem: &'a str,
    pub workspace: &'a str,
}

impl CommandContext<'_> {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "executable" => Some(self.executable),
            "input" => Some(self.input),
            "stem" => Some(self.stem),
            "workspace" => Some(self.workspace),
            _ => None,
        }
    }
}

/// Expands `{executable}`, `{input}`, `{stem}` and `{workspace}` in each arg.
///
/// Substituted values are never expanded again; unknown `{...}` text is kept.
pub fn expand_args(args: &[String], ctx: &CommandContext<'_>) -> Vec<String> {
    args.iter().map(|arg| expand_one(arg, ctx)).collect()
}

fn expand_one(arg: &str, ctx: &CommandContext<'_>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}').and_then(|close| Some((close, ctx.lookup(&after[..close])?))) {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
