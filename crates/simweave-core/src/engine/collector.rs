use super::workspace::WorkspaceError;
use crate::core::params::{Parameters, Value};
use crate::core::results::{ExecInfo, Results, ResultsError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PostprocessError {
    #[error("Expected output '{0}' was not produced")]
    MissingOutput(String),
    #[error("Failed to parse '{file}': {reason}")]
    Parse { file: String, reason: String },
    #[error(transparent)]
    Results(#[from] ResultsError),
    #[error("Output converter failed: {0}")]
    Converter(String),
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// What a postprocessor gets to look at after a successful execution.
#[derive(Debug, Clone, Copy)]
pub struct PostprocessContext<'a> {
    pub workspace: &'a Path,
    /// Tracked input artifacts relative to `workspace`, primary input first.
    pub inputs: &'a [String],
    /// Everything else present after execution, relative to `workspace`.
    pub outputs: &'a [String],
    pub parameters: &'a Parameters,
}

impl PostprocessContext<'_> {
    pub fn path_of(&self, relative: &str) -> PathBuf {
        self.workspace.join(relative)
    }

    pub fn primary_input(&self) -> Option<&str> {
        self.inputs.first().map(String::as_str)
    }
}

/// Turns raw output artifacts into structured [`Results`] data.
pub trait Postprocess: Send + Sync {
    fn name(&self) -> &str;

    fn postprocess(
        &self,
        ctx: &PostprocessContext<'_>,
    ) -> Result<BTreeMap<String, Value>, PostprocessError>;
}

/// Lists every file under `root` as a sorted, `/`-separated relative path.
pub fn list_artifacts(root: &Path) -> Result<Vec<String>, WorkspaceError> {
    let mut found = Vec::new();
    walk(root, root, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(root: &Path, dir: &Path, found: &mut Vec<String>) -> Result<(), WorkspaceError> {
    let scan_err = |e: std::io::Error| WorkspaceError::Scan {
        path: dir.to_string_lossy().to_string(),
        source: e,
    };
    for entry in std::fs::read_dir(dir).map_err(scan_err)? {
        let entry = entry.map_err(scan_err)?;
        let path = entry.path();
        if entry.file_type().map_err(scan_err)?.is_dir() {
            walk(root, &path, found)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            found.push(parts.join("/"));
        }
    }
    Ok(())
}

/// Enumerates a finished workspace and runs the configured postprocessors.
#[derive(Default)]
pub struct Collector {
    include_inputs: bool,
    postprocessors: Vec<Box<dyn Postprocess>>,
}

impl Collector {
    pub fn new(include_inputs: bool) -> Self {
        Self {
            include_inputs,
            postprocessors: Vec::new(),
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: impl Postprocess + 'static) -> Self {
        self.postprocessors.push(Box::new(postprocessor));
        self
    }

    pub fn push(&mut self, postprocessor: Box<dyn Postprocess>) {
        self.postprocessors.push(postprocessor);
    }

    pub fn postprocessor_names(&self) -> Vec<&str> {
        self.postprocessors.iter().map(|p| p.name()).collect()
    }

    /// Builds the [`Results`] for `workspace`.
    ///
    /// `tracked_inputs` are the rendered and staged files; they are excluded
    /// from the outputs unless the collector includes inputs. A postprocessor
    /// failure is recorded in `postprocess_error` and never discards the
    /// Results.
    pub fn collect(
        &self,
        workspace: &Path,
        tracked_inputs: &[String],
        parameters: &Parameters,
        exec_info: ExecInfo,
    ) -> Result<Results, WorkspaceError> {
        let tracked: BTreeSet<&str> = tracked_inputs.iter().map(String::as_str).collect();
        let split = |all: Vec<String>| -> (Vec<String>, Vec<String>) {
            // Inputs keep the caller's order so the primary input stays first.
            let present: BTreeSet<&str> = all.iter().map(String::as_str).collect();
            let mut seen = BTreeSet::new();
            let inputs = tracked_inputs
                .iter()
                .filter(|t| present.contains(t.as_str()) && seen.insert(t.as_str()))
                .cloned()
                .collect();
            let outputs = all
                .into_iter()
                .filter(|a| self.include_inputs || !tracked.contains(a.as_str()))
                .collect();
            (inputs, outputs)
        };

        let (mut inputs, mut outputs) = split(list_artifacts(workspace)?);
        let mut data = BTreeMap::new();
        let mut errors = Vec::new();

        if !self.postprocessors.is_empty() {
            let ctx = PostprocessContext {
                workspace,
                inputs: &inputs,
                outputs: &outputs,
                parameters,
            };
            for postprocessor in &self.postprocessors {
                match postprocessor.postprocess(&ctx) {
                    Ok(extracted) => {
                        debug!(
                            postprocessor = postprocessor.name(),
                            entries = extracted.len(),
                            "Postprocessing succeeded."
                        );
                        data.extend(extracted);
                    }
                    Err(e) => {
                        warn!(postprocessor = postprocessor.name(), error = %e, "Postprocessing failed.");
                        errors.push(format!("{}: {}", postprocessor.name(), e));
                    }
                }
            }
            // Postprocessors may have produced new files (converted outputs).
            (inputs, outputs) = split(list_artifacts(workspace)?);
        }

        Ok(Results {
            location: workspace.to_path_buf(),
            inputs,
            outputs,
            postprocess_error: (!errors.is_empty()).then(|| errors.join("; ")),
            exec_info,
            parameters: parameters.clone(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    struct Failing;

    impl Postprocess for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn postprocess(
            &self,
            _ctx: &PostprocessContext<'_>,
        ) -> Result<BTreeMap<String, Value>, PostprocessError> {
            Err(PostprocessError::MissingOutput("out.csv".into()))
        }
    }

    struct CountOutputs;

    impl Postprocess for CountOutputs {
        fn name(&self) -> &str {
            "count"
        }
        fn postprocess(
            &self,
            ctx: &PostprocessContext<'_>,
        ) -> Result<BTreeMap<String, Value>, PostprocessError> {
            let mut data = BTreeMap::new();
            data.insert("count".to_string(), Value::Int(ctx.outputs.len() as i64));
            Ok(data)
        }
    }

    fn exec_info() -> ExecInfo {
        ExecInfo {
            job_id: "job".into(),
            plugin_name: "test".into(),
            timestamp: Utc::now(),
            duration_secs: 0.0,
            exit_code: Some(0),
        }
    }

    fn populated() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("input.txt"), "in").unwrap();
        std::fs::write(dir.path().join("b.out"), "b").unwrap();
        std::fs::create_dir(dir.path().join("plots")).unwrap();
        std::fs::write(dir.path().join("plots/a.csv"), "x\n1\n").unwrap();
        dir
    }

    #[test]
    fn list_artifacts_is_recursive_and_sorted() {
        let dir = populated();
        assert_eq!(
            list_artifacts(dir.path()).unwrap(),
            vec!["b.out", "input.txt", "plots/a.csv"]
        );
    }

    #[test]
    fn collect_excludes_tracked_inputs_by_default() {
        let dir = populated();
        let tracked = vec!["input.txt".to_string()];
        let results = Collector::new(false)
            .collect(dir.path(), &tracked, &Parameters::new(), exec_info())
            .unwrap();
        assert_eq!(results.inputs, vec!["input.txt"]);
        assert_eq!(results.outputs, vec!["b.out", "plots/a.csv"]);

        let with_inputs = Collector::new(true)
            .collect(dir.path(), &tracked, &Parameters::new(), exec_info())
            .unwrap();
        assert_eq!(with_inputs.outputs.len(), 3);
    }

    #[test]
    fn inputs_keep_tracked_order_with_primary_first() {
        let dir = populated();
        std::fs::write(dir.path().join("aaa_lumped.dat"), "1").unwrap();
        let tracked = vec![
            "input.txt".to_string(),
            "aaa_lumped.dat".to_string(),
            "gone.dat".to_string(),
        ];
        let results = Collector::new(false)
            .collect(dir.path(), &tracked, &Parameters::new(), exec_info())
            .unwrap();
        assert_eq!(results.inputs, vec!["input.txt", "aaa_lumped.dat"]);
        assert_eq!(results.outputs, vec!["b.out", "plots/a.csv"]);
    }

    #[test]
    fn collect_twice_yields_identical_artifacts() {
        let dir = populated();
        let collector = Collector::new(false);
        let tracked = vec!["input.txt".to_string()];
        let first = collector
            .collect(dir.path(), &tracked, &Parameters::new(), exec_info())
            .unwrap();
        let second = collector
            .collect(dir.path(), &tracked, &Parameters::new(), exec_info())
            .unwrap();
        assert_eq!(first.outputs, second.outputs);
        assert_eq!(first.inputs, second.inputs);
    }

    #[test]
    fn postprocess_failure_is_attached_not_fatal() {
        let dir = populated();
        let collector = Collector::new(false)
            .with_postprocessor(Failing)
            .with_postprocessor(CountOutputs);
        let results = collector
            .collect(dir.path(), &["input.txt".to_string()], &Parameters::new(), exec_info())
            .unwrap();

        let error = results.postprocess_error.as_deref().unwrap();
        assert!(error.starts_with("failing:"));
        assert_eq!(results.data.get("count"), Some(&Value::Int(2)));
        assert_eq!(results.outputs.len(), 2);
    }
}
