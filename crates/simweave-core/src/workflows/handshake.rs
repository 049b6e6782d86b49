//! The file handshake between an outer optimization/UQ tool and the driver.
//!
//! The wire format is the Dakota "standard" parameters file and the plain
//! results file. Framing is explicit: a data file is only considered complete
//! once its `<file>.done` marker exists, and writers create the marker only
//! after the data file has been atomically renamed into place.

use crate::core::params::{Parameters, Value};
use crate::core::utils::format_scientific;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

pub const DONE_SUFFIX: &str = ".done";
pub const STOP_MARKER: &str = "stop";
pub const FAIL_RESPONSE: &str = "FAIL";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Handshake I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Malformed handshake file '{file}' at line {line}: {reason}")]
    Malformed {
        file: String,
        line: usize,
        reason: String,
    },
    #[error("Timed out after {waited:?} waiting for '{path}'")]
    Timeout { path: String, waited: Duration },
}

/// A response the outer tool requested, with its active set vector entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedResponse {
    pub label: String,
    pub asv: u8,
}

/// The contents of one parameters file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    pub variables: Vec<(String, Value)>,
    pub responses: Vec<RequestedResponse>,
    pub eval_id: Option<String>,
}

impl ParameterSet {
    pub fn parse(text: &str, file: &str) -> Result<Self, HandshakeError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let n_vars = read_count(&mut lines, "variables", file)?;
        let mut variables = Vec::with_capacity(n_vars);
        for _ in 0..n_vars {
            let (n, line) = lines
                .next()
                .ok_or_else(|| malformed(file, 0, "truncated variables section"))?;
            let (value, label) =
                split_pair(line).ok_or_else(|| malformed(file, n, "expected '<value> <descriptor>'"))?;
            let value = match value.parse::<f64>() {
                Ok(x) => Value::Float(x),
                Err(_) => Value::String(value.to_string()),
            };
            variables.push((label.to_string(), value));
        }

        let n_funcs = read_count(&mut lines, "functions", file)?;
        let mut responses = Vec::with_capacity(n_funcs);
        for _ in 0..n_funcs {
            let (n, line) = lines
                .next()
                .ok_or_else(|| malformed(file, 0, "truncated functions section"))?;
            let parsed = split_pair(line).and_then(|(asv, tag)| {
                let asv = asv.parse::<u8>().ok()?;
                let (_, label) = tag.split_once(':')?;
                Some(RequestedResponse {
                    label: label.to_string(),
                    asv,
                })
            });
            responses.push(parsed.ok_or_else(|| malformed(file, n, "expected '<asv> ASV_<i>:<label>'"))?);
        }

        // Derivative variables and analysis components are not used; only the
        // evaluation id is kept for logging.
        let eval_id = lines.find_map(|(_, line)| {
            let (value, tag) = split_pair(line)?;
            (tag == "eval_id").then(|| value.to_string())
        });

        Ok(Self {
            variables,
            responses,
            eval_id,
        })
    }

    /// Writes the set back in the standard format; used by the outer side.
    pub fn format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:>20} variables", self.variables.len());
        for (label, value) in &self.variables {
            let rendered = match value.as_f64() {
                Some(x) => format_scientific(x, 15),
                None => value.to_string(),
            };
            let _ = writeln!(out, "{:>24} {}", rendered, label);
        }
        let _ = writeln!(out, "{:>20} functions", self.responses.len());
        for (i, response) in self.responses.iter().enumerate() {
            let _ = writeln!(out, "{:>20} ASV_{}:{}", response.asv, i + 1, response.label);
        }
        if let Some(id) = &self.eval_id {
            let _ = writeln!(out, "{:>20} eval_id", id);
        }
        out
    }

    pub fn to_parameters(&self) -> Parameters {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.responses.iter().map(|r| r.label.clone()).collect()
    }
}

fn malformed(file: &str, line: usize, reason: &str) -> HandshakeError {
    HandshakeError::Malformed {
        file: file.to_string(),
        line,
        reason: reason.to_string(),
    }
}

/// Reads a `<count> <what>` section header.
fn read_count<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    what: &str,
    file: &str,
) -> Result<usize, HandshakeError> {
    let (n, line) = lines
        .next()
        .ok_or_else(|| malformed(file, 0, &format!("missing '{}' header", what)))?;
    match split_pair(line) {
        Some((count, label)) if label == what => count
            .parse::<usize>()
            .map_err(|_| malformed(file, n, &format!("invalid {} count '{}'", what, count))),
        _ => Err(malformed(file, n, &format!("expected '<count> {}'", what))),
    }
}

fn split_pair(line: &str) -> Option<(&str, &str)> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    let second = tokens.next()?;
    Some((first, second))
}

/// The answer for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Values(Vec<(String, f64)>),
    Fail,
}

impl Response {
    pub fn format(&self) -> String {
        match self {
            Response::Values(values) => values
                .iter()
                .map(|(label, v)| format!("{} {}\n", format_scientific(*v, 15), label))
                .collect(),
            Response::Fail => format!("{}\n", FAIL_RESPONSE),
        }
    }

    pub fn parse(text: &str, file: &str) -> Result<Self, HandshakeError> {
        if text.trim() == FAIL_RESPONSE {
            return Ok(Response::Fail);
        }
        text.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, line)| {
                let mut tokens = line.split_whitespace();
                let value = tokens.next().and_then(|t| t.parse::<f64>().ok());
                let label = tokens.next().unwrap_or_default();
                value
                    .map(|v| (label.to_string(), v))
                    .ok_or_else(|| HandshakeError::Malformed {
                        file: file.to_string(),
                        line: i + 1,
                        reason: "expected '<value> <label>'".into(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Response::Values)
    }
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> HandshakeError + '_ {
    move |e| HandshakeError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    }
}

pub fn done_marker(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(DONE_SUFFIX);
    PathBuf::from(name)
}

/// Writes `contents` to `path` via a temporary file and rename, leaving no
/// completion marker.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), HandshakeError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, contents).map_err(io_err(&tmp))?;
    std::fs::rename(&tmp, path).map_err(io_err(path))
}

/// Writes a data file and then signals its completion.
pub fn write_framed(path: &Path, contents: &str) -> Result<(), HandshakeError> {
    write_atomic(path, contents)?;
    let marker = done_marker(path);
    std::fs::write(&marker, b"").map_err(io_err(&marker))?;
    trace!(path = %path.display(), "Signalled handshake file.");
    Ok(())
}

/// Outcome of waiting on a framed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Data(String),
    Stopped,
}

/// Waits for `path` to be signalled complete (or for `stop` to appear), then
/// reads and consumes it.
pub fn wait_framed(
    path: &Path,
    stop: Option<&Path>,
    poll: Duration,
    timeout: Option<Duration>,
) -> Result<Received, HandshakeError> {
    let marker = done_marker(path);
    let start = Instant::now();
    loop {
        if marker.exists() {
            let contents = std::fs::read_to_string(path).map_err(io_err(path))?;
            std::fs::remove_file(&marker).map_err(io_err(&marker))?;
            std::fs::remove_file(path).map_err(io_err(path))?;
            return Ok(Received::Data(contents));
        }
        if stop.is_some_and(Path::exists) {
            return Ok(Received::Stopped);
        }
        if let Some(limit) = timeout {
            if start.elapsed() >= limit {
                return Err(HandshakeError::Timeout {
                    path: path.to_string_lossy().to_string(),
                    waited: start.elapsed(),
                });
            }
        }
        thread::sleep(poll);
    }
}

/// A message channel to the outer tool, one exchange per evaluation.
pub trait HandshakeChannel {
    /// Blocks until the next parameter set arrives; `None` once the outer
    /// tool has signalled that it is finished.
    fn receive(&mut self) -> Result<Option<ParameterSet>, HandshakeError>;

    fn respond(&mut self, response: &Response) -> Result<(), HandshakeError>;
}

/// [`HandshakeChannel`] over framed files in a shared directory.
#[derive(Debug, Clone)]
pub struct FileChannel {
    dir: PathBuf,
    params_name: String,
    results_name: String,
    poll: Duration,
    timeout: Option<Duration>,
}

impl FileChannel {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            params_name: "params.in".to_string(),
            results_name: "results.out".to_string(),
            poll: Duration::from_millis(25),
            timeout: None,
        }
    }

    pub fn file_names(mut self, params: impl Into<String>, results: impl Into<String>) -> Self {
        self.params_name = params.into();
        self.results_name = results.into();
        self
    }

    pub fn poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn params_path(&self) -> PathBuf {
        self.dir.join(&self.params_name)
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(&self.results_name)
    }

    pub fn stop_path(&self) -> PathBuf {
        self.dir.join(STOP_MARKER)
    }
}

impl HandshakeChannel for FileChannel {
    fn receive(&mut self) -> Result<Option<ParameterSet>, HandshakeError> {
        let path = self.params_path();
        match wait_framed(&path, Some(&self.stop_path()), self.poll, self.timeout)? {
            Received::Data(text) => {
                let set = ParameterSet::parse(&text, &self.params_name)?;
                debug!(
                    variables = set.variables.len(),
                    eval_id = ?set.eval_id,
                    "Received parameter set."
                );
                Ok(Some(set))
            }
            Received::Stopped => Ok(None),
        }
    }

    fn respond(&mut self, response: &Response) -> Result<(), HandshakeError> {
        write_framed(&self.results_path(), &response.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PARAMS: &str = "\
                     2 variables
                      1.500000000000000e+00 radius
                      core height
                     1 functions
                     1 ASV_1:obj_fn
                     2 derivative_variables
                     1 DVV_1:1
                     2 DVV_2:2
                     0 analysis_components
                     1:3 eval_id
";

    #[test]
    fn parse_reads_variables_and_responses_in_order() {
        let set = ParameterSet::parse(PARAMS, "params.in").unwrap();
        assert_eq!(
            set.variables,
            vec![
                ("radius".to_string(), Value::Float(1.5)),
                ("height".to_string(), Value::String("core".into())),
            ]
        );
        assert_eq!(
            set.responses,
            vec![RequestedResponse {
                label: "obj_fn".into(),
                asv: 1
            }]
        );
        assert_eq!(set.eval_id.as_deref(), Some("1:3"));
        assert_eq!(set.to_parameters().get("radius"), Some(&Value::Float(1.5)));
    }

    #[test]
    fn parse_rejects_truncated_or_malformed_files() {
        let truncated = "2 variables\n1.0 x\n";
        assert!(matches!(
            ParameterSet::parse(truncated, "p"),
            Err(HandshakeError::Malformed { .. })
        ));

        let bad_header = "two variables\n";
        match ParameterSet::parse(bad_header, "p") {
            Err(HandshakeError::Malformed { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected malformed, got {:?}", other),
        }

        let bad_asv = "1 variables\n1.0 x\n1 functions\n1 obj\n";
        assert!(ParameterSet::parse(bad_asv, "p").is_err());
    }

    #[test]
    fn format_is_readable_by_parse() {
        let set = ParameterSet::parse(PARAMS, "params.in").unwrap();
        let again = ParameterSet::parse(&set.format(), "params.in").unwrap();
        assert_eq!(again, set);
    }

    #[test]
    fn response_format_matches_wire_contract() {
        let response = Response::Values(vec![("obj_fn".into(), -0.5), ("mass".into(), 350.0)]);
        assert_eq!(
            response.format(),
            "-5.000000000000000e-01 obj_fn\n3.500000000000000e+02 mass\n"
        );
        assert_eq!(Response::Fail.format(), "FAIL\n");
        assert_eq!(
            Response::parse(&response.format(), "results.out").unwrap(),
            response
        );
        assert_eq!(Response::parse("FAIL\n", "r").unwrap(), Response::Fail);
    }

    #[test]
    fn wait_framed_ignores_files_without_marker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.in");
        std::fs::write(&path, "partial").unwrap();

        let result = wait_framed(
            &path,
            None,
            Duration::from_millis(5),
            Some(Duration::from_millis(50)),
        );
        assert!(matches!(result, Err(HandshakeError::Timeout { .. })));
        assert!(path.exists());
    }

    #[test]
    fn wait_framed_consumes_signalled_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.in");
        write_framed(&path, "payload").unwrap();

        let received = wait_framed(&path, None, Duration::from_millis(5), None).unwrap();
        assert_eq!(received, Received::Data("payload".into()));
        assert!(!path.exists());
        assert!(!done_marker(&path).exists());
    }

    #[test]
    fn file_channel_reports_stop() {
        let dir = tempdir().unwrap();
        let mut channel = FileChannel::new(dir.path()).poll_interval(Duration::from_millis(5));
        std::fs::write(channel.stop_path(), b"").unwrap();
        assert_eq!(channel.receive().unwrap(), None);
    }

    #[test]
    fn file_channel_round_trips_one_exchange() {
        let dir = tempdir().unwrap();
        let mut channel = FileChannel::new(dir.path()).poll_interval(Duration::from_millis(5));
        write_framed(&channel.params_path(), PARAMS).unwrap();

        let set = channel.receive().unwrap().unwrap();
        assert_eq!(set.labels(), vec!["obj_fn"]);

        channel
            .respond(&Response::Values(vec![("obj_fn".into(), 1.0)]))
            .unwrap();
        let reply = wait_framed(&channel.results_path(), None, Duration::from_millis(5), None).unwrap();
        assert_eq!(reply, Received::Data("1.000000000000000e+00 obj_fn\n".into()));
    }
}
