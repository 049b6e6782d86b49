use super::config::{Environment, ExecutableSpec};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Executable '{name}' not found (searched {searched} location(s))")]
    ExecutableNotFound { name: String, searched: usize },
    #[error("Failed to launch '{executable}': {source}")]
    Launch {
        executable: PathBuf,
        source: io::Error,
    },
    #[error("'{executable}' did not finish within {timeout:?} and was killed")]
    Timeout {
        executable: PathBuf,
        timeout: Duration,
    },
    #[error("Failed while waiting for '{executable}': {source}")]
    Wait {
        executable: PathBuf,
        source: io::Error,
    },
}

/// Finds the executable described by `spec`.
///
/// Resolution order: the explicit path (a bare explicit name is searched on
/// `PATH`), then `<$dir_var>/<default_name>`, then `default_name` on `PATH`.
pub fn resolve_executable(spec: &ExecutableSpec, env: &Environment) -> Result<PathBuf, ProcessError> {
    let mut searched = 0;

    if let Some(explicit) = &spec.explicit {
        if explicit.components().count() > 1 || explicit.is_absolute() {
            searched += 1;
            return if is_executable(explicit) {
                Ok(explicit.clone())
            } else {
                Err(ProcessError::ExecutableNotFound {
                    name: explicit.to_string_lossy().to_string(),
                    searched,
                })
            };
        }
        return search_path(&explicit.to_string_lossy(), env).ok_or_else(|| {
            ProcessError::ExecutableNotFound {
                name: explicit.to_string_lossy().to_string(),
                searched: env.search_path().len(),
            }
        });
    }

    if let Some(dir) = spec.dir_var.as_deref().and_then(|var| env.get(var)) {
        searched += 1;
        let candidate = Path::new(dir).join(&spec.default_name);
        if is_executable(&candidate) {
            return Ok(candidate);
        }
        debug!(
            candidate = %candidate.display(),
            "Executable not found under configured directory; falling back to PATH."
        );
    }

    search_path(&spec.default_name, env).ok_or_else(|| ProcessError::ExecutableNotFound {
        name: spec.default_name.clone(),
        searched: searched + env.search_path().len(),
    })
}

fn search_path(name: &str, env: &Environment) -> Option<PathBuf> {
    env.search_path()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added to the inherited environment of the child.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub timeout: Option<Duration>,
    pub echo_stdout: bool,
    pub echo_stderr: bool,
}

impl ExecutionRequest {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
            timeout: None,
            echo_stdout: false,
            echo_stderr: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Raw bytes as written by the process.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R: Read + Send + 'static>(
    source: R,
    echo: bool,
    stream: Stream,
) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut captured = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if echo {
                        // Echo is best effort; capture must not depend on it.
                        let _ = match stream {
                            Stream::Stdout => io::stdout().write_all(&line),
                            Stream::Stderr => io::stderr().write_all(&line),
                        };
                    }
                    captured.extend_from_slice(&line);
                }
            }
        }
        captured
    })
}

fn collect_output(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .map(|h| h.join().unwrap_or_default())
        .unwrap_or_default()
}

/// Runs the request to completion, capturing both output streams.
///
/// A non-zero exit is reported through [`ExecutionResult::success`], not as
/// an error; only launch failures and timeouts are errors.
#[instrument(skip_all, fields(program = %request.program.display()))]
pub fn run(request: &ExecutionRequest) -> Result<ExecutionResult, ProcessError> {
    let start = Instant::now();
    debug!(args = ?request.args, cwd = %request.cwd.display(), "Launching process.");

    let mut child = Command::new(&request.program)
        .args(&request.args)
        .envs(&request.env)
        .current_dir(&request.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProcessError::Launch {
            executable: request.program.clone(),
            source: e,
        })?;

    let stdout = child
        .stdout
        .take()
        .map(|s| spawn_reader(s, request.echo_stdout, Stream::Stdout));
    let stderr = child
        .stderr
        .take()
        .map(|s| spawn_reader(s, request.echo_stderr, Stream::Stderr));

    let wait_err = |e: io::Error| ProcessError::Wait {
        executable: request.program.clone(),
        source: e,
    };
    let status: ExitStatus = match request.timeout {
        None => child.wait().map_err(wait_err)?,
        Some(limit) => loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                break status;
            }
            if start.elapsed() >= limit {
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to kill timed-out process.");
                }
                let _ = child.wait();
                // Reader threads may still be blocked on pipes held open by
                // grandchildren, so they are left to finish on their own.
                return Err(ProcessError::Timeout {
                    executable: request.program.clone(),
                    timeout: limit,
                });
            }
            thread::sleep(POLL_INTERVAL);
        },
    };

    let result = ExecutionResult {
        exit_code: status.code(),
        stdout: collect_output(stdout),
        stderr: collect_output(stderr),
        duration: start.elapsed(),
    };
    debug!(
        exit_code = ?result.exit_code,
        duration_ms = result.duration.as_millis() as u64,
        "Process finished."
    );
    Ok(result)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    fn sh(script: &str, cwd: &Path) -> ExecutionRequest {
        ExecutionRequest::new("/bin/sh", cwd).args(["-c", script])
    }

    fn write_script(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn run_captures_streams_and_exit_code() {
        let dir = tempdir().unwrap();
        let result = run(&sh("printf 'out\\n'; printf 'err' >&2; exit 3", dir.path())).unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stdout, b"out\n");
        assert_eq!(result.stderr_text(), "err");
        assert!(!result.success());
    }

    #[test]
    fn run_uses_cwd_and_env_overrides() {
        let dir = tempdir().unwrap();
        let mut request = sh("pwd; printf '%s' \"$SIMWEAVE_TEST\"", dir.path());
        request.env.insert("SIMWEAVE_TEST".into(), "42".into());
        let result = run(&request).unwrap();
        assert!(result.success());

        let stdout = result.stdout_text();
        let mut lines = stdout.lines();
        let pwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(pwd.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
        assert_eq!(lines.next(), Some("42"));
    }

    #[test]
    fn run_keeps_non_utf8_output_bytes() {
        let dir = tempdir().unwrap();
        let result = run(&sh("printf '\\377\\376bad' >&2; exit 1", dir.path())).unwrap();
        assert_eq!(result.stderr, vec![0xff, 0xfe, b'b', b'a', b'd']);
        assert!(result.stderr_text().ends_with("bad"));
    }

    #[test]
    fn run_reports_launch_failure_distinctly() {
        let dir = tempdir().unwrap();
        let request = ExecutionRequest::new(dir.path().join("missing-binary"), dir.path());
        assert!(matches!(run(&request), Err(ProcessError::Launch { .. })));
    }

    #[test]
    fn run_kills_process_after_timeout() {
        let dir = tempdir().unwrap();
        let request = sh("exec sleep 5", dir.path()).timeout(Some(Duration::from_millis(200)));
        let start = Instant::now();
        let result = run(&request);
        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn resolve_prefers_explicit_then_dir_var_then_path() {
        let bin = tempdir().unwrap();
        let tool_dir = tempdir().unwrap();
        let on_path = write_script(bin.path(), "sim");
        let in_dir = write_script(tool_dir.path(), "sim");
        let env = Environment::from_vars([
            ("PATH", bin.path().to_string_lossy().to_string()),
            ("SIM_DIR", tool_dir.path().to_string_lossy().to_string()),
        ]);

        let spec = ExecutableSpec::named("sim");
        assert_eq!(resolve_executable(&spec, &env).unwrap(), on_path);

        let with_dir = spec.clone().with_dir_var("SIM_DIR");
        assert_eq!(resolve_executable(&with_dir, &env).unwrap(), in_dir);

        let explicit = with_dir.with_explicit(&on_path);
        assert_eq!(resolve_executable(&explicit, &env).unwrap(), on_path);
    }

    #[test]
    fn resolve_fails_before_spawning_when_not_found() {
        let bin = tempdir().unwrap();
        let env = Environment::from_vars([("PATH", bin.path().to_string_lossy().to_string())]);

        let missing = ExecutableSpec::named("does-not-exist");
        assert!(matches!(
            resolve_executable(&missing, &env),
            Err(ProcessError::ExecutableNotFound { .. })
        ));

        let bad_explicit = missing.with_explicit(bin.path().join("nope"));
        assert!(matches!(
            resolve_executable(&bad_explicit, &env),
            Err(ProcessError::ExecutableNotFound { .. })
        ));
    }

    #[test]
    fn resolve_skips_non_executable_files() {
        let bin = tempdir().unwrap();
        std::fs::write(bin.path().join("sim"), "not executable").unwrap();
        let env = Environment::from_vars([("PATH", bin.path().to_string_lossy().to_string())]);
        assert!(resolve_executable(&ExecutableSpec::named("sim"), &env).is_err());
    }
}
