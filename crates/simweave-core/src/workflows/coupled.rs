use super::handshake::{HandshakeChannel, HandshakeError, ParameterSet, Response, write_atomic};
use crate::core::params::{Parameters, Value};
use crate::core::results::Results;
use crate::engine::error::PluginError;
use crate::engine::plugin::Plugin;
use crate::engine::progress::{Progress, ProgressReporter};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum CouplingError {
    #[error("Handshake protocol error: {0}")]
    Protocol(#[from] HandshakeError),
    #[error("Iteration {iteration} failed: {source}")]
    IterationFailed {
        iteration: usize,
        source: Box<PluginError>,
    },
    #[error("Response '{label}' not found in results")]
    ResponseMissing { label: String },
    #[error("Response '{label}' is not numeric")]
    ResponseNotNumeric { label: String },
}

/// Where the value for a requested response comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
    /// A dotted path into the Results data, e.g. `opt_res.out.keff`.
    Data(String),
    /// A parameter carried on the Results.
    Parameter(String),
}

/// Maps the response labels the outer tool asks for onto Results values.
///
/// Unmapped labels are looked up as a data path first and as a parameter
/// second. Array values (CSV columns) answer with their last element.
#[derive(Debug, Clone, Default)]
pub struct ResponseMap {
    sources: BTreeMap<String, ResponseSource>,
}

impl ResponseMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, label: impl Into<String>, source: ResponseSource) -> Self {
        self.sources.insert(label.into(), source);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, source: ResponseSource) {
        self.sources.insert(label.into(), source);
    }

    pub fn extract(
        &self,
        labels: &[String],
        results: &Results,
    ) -> Result<Vec<(String, f64)>, CouplingError> {
        labels
            .iter()
            .map(|label| {
                let value = match self.sources.get(label) {
                    Some(ResponseSource::Data(path)) => results.data_at(path),
                    Some(ResponseSource::Parameter(name)) => results.parameters.get(name),
                    None => results
                        .data_at(label)
                        .or_else(|| results.parameters.get(label)),
                }
                .ok_or_else(|| CouplingError::ResponseMissing {
                    label: label.clone(),
                })?;
                numeric(value)
                    .map(|v| (label.clone(), v))
                    .ok_or_else(|| CouplingError::ResponseNotNumeric {
                        label: label.clone(),
                    })
            })
            .collect()
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Array(items) => items.last().and_then(Value::as_f64),
        other => other.as_f64(),
    }
}

/// Per-iteration Results of a coupled run, in iteration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoupledResults {
    iterations: Vec<Results>,
}

impl CoupledResults {
    pub fn iterations(&self) -> &[Results] {
        &self.iterations
    }

    /// The last successfully completed iteration.
    pub fn final_results(&self) -> Option<&Results> {
        self.iterations.last()
    }

    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    pub fn into_vec(self) -> Vec<Results> {
        self.iterations
    }
}

/// A coupled run that stopped early; keeps what was completed before.
#[derive(Debug, Error)]
#[error("{error} (after {} completed iteration(s))", .completed.len())]
pub struct CoupledFailure {
    pub completed: CoupledResults,
    #[source]
    pub error: CouplingError,
}

/// Drives a nested plugin once per parameter set received from an outer
/// optimization or UQ tool.
pub struct CoupledWorkflow<'p, C> {
    plugin: &'p Plugin,
    channel: C,
    responses: ResponseMap,
    base: Parameters,
    max_iterations: Option<usize>,
}

impl<'p, C: HandshakeChannel> CoupledWorkflow<'p, C> {
    pub fn new(plugin: &'p Plugin, channel: C) -> Self {
        Self {
            plugin,
            channel,
            responses: ResponseMap::new(),
            base: Parameters::new(),
            max_iterations: None,
        }
    }

    pub fn responses(mut self, responses: ResponseMap) -> Self {
        self.responses = responses;
        self
    }

    /// Parameters every iteration starts from; received variables override them.
    pub fn base_parameters(mut self, base: Parameters) -> Self {
        self.base = base;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    pub fn run(&mut self) -> Result<CoupledResults, CoupledFailure> {
        self.run_with_reporter(&ProgressReporter::new())
    }

    #[instrument(skip_all, name = "coupled_run", fields(plugin = %self.plugin.name()))]
    pub fn run_with_reporter(
        &mut self,
        reporter: &ProgressReporter,
    ) -> Result<CoupledResults, CoupledFailure> {
        let mut completed = Vec::new();
        let fail = |completed: Vec<Results>, error: CouplingError| CoupledFailure {
            completed: CoupledResults {
                iterations: completed,
            },
            error,
        };

        loop {
            if self.max_iterations.is_some_and(|max| completed.len() >= max) {
                info!(iterations = completed.len(), "Reached iteration limit.");
                break;
            }
            let set = match self.channel.receive() {
                Ok(Some(set)) => set,
                Ok(None) => {
                    info!(iterations = completed.len(), "Outer tool signalled stop.");
                    break;
                }
                Err(e) => return Err(fail(completed, e.into())),
            };

            let iteration = completed.len() + 1;
            reporter.report(Progress::IterationStart { iteration });
            match self.iterate(&set, iteration, reporter) {
                Ok(results) => completed.push(results),
                Err(e) => {
                    if let Err(reply) = self.channel.respond(&Response::Fail) {
                        warn!(error = %reply, "Failed to signal failure to outer tool.");
                    }
                    return Err(fail(completed, e));
                }
            }
            reporter.report(Progress::IterationFinish { iteration });
        }

        Ok(CoupledResults {
            iterations: completed,
        })
    }

    fn iterate(
        &mut self,
        set: &ParameterSet,
        iteration: usize,
        reporter: &ProgressReporter,
    ) -> Result<Results, CouplingError> {
        let params = self.base.clone().merged(&set.to_parameters());
        let results = self
            .plugin
            .run_with_reporter(&params, reporter)
            .map_err(|e| CouplingError::IterationFailed {
                iteration,
                source: Box::new(e),
            })?;
        let values = self.responses.extract(&set.labels(), &results)?;
        self.channel.respond(&Response::Values(values))?;
        info!(iteration, job_id = results.job_id(), "Iteration complete.");
        Ok(results)
    }
}

/// One evaluation for outer tools that spawn the driver per evaluation:
/// reads `params_file`, runs the plugin and writes `response_file`.
///
/// On failure a `FAIL` response is written before the error is returned.
pub fn driver_step(
    plugin: &Plugin,
    params_file: &Path,
    response_file: &Path,
    responses: &ResponseMap,
    base: &Parameters,
) -> Result<Results, CouplingError> {
    let outcome = (|| {
        let text = std::fs::read_to_string(params_file).map_err(|e| HandshakeError::Io {
            path: params_file.to_string_lossy().to_string(),
            source: e,
        })?;
        let file = params_file.to_string_lossy();
        let set = ParameterSet::parse(&text, &file)?;
        let params = base.clone().merged(&set.to_parameters());
        let results = plugin
            .run(&params)
            .map_err(|e| CouplingError::IterationFailed {
                iteration: 1,
                source: Box::new(e),
            })?;
        let values = responses.extract(&set.labels(), &results)?;
        Ok((results, Response::Values(values)))
    })();

    match outcome {
        Ok((results, response)) => {
            write_atomic(response_file, &response.format())?;
            Ok(results)
        }
        Err(e) => {
            write_atomic(response_file, &Response::Fail.format())?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::results::ExecInfo;
    use chrono::Utc;
    use std::path::PathBuf;

    fn results_with(data: BTreeMap<String, Value>, params: Parameters) -> Results {
        Results {
            location: PathBuf::from("/tmp/job"),
            inputs: vec![],
            outputs: vec![],
            postprocess_error: None,
            exec_info: ExecInfo {
                job_id: "job".into(),
                plugin_name: "p".into(),
                timestamp: Utc::now(),
                duration_secs: 0.0,
                exit_code: Some(0),
            },
            parameters: params,
            data,
        }
    }

    #[test]
    fn extract_uses_mapping_then_data_then_parameters() {
        let mut file = BTreeMap::new();
        file.insert("keff".to_string(), Value::Float(1.02));
        let mut data = BTreeMap::new();
        data.insert("opt_res.out".to_string(), Value::Table(file));
        data.insert(
            "power".to_string(),
            Value::Array(vec![Value::Float(1.0), Value::Float(3.0)]),
        );
        let results = results_with(data, Parameters::new().with("radius", 2));

        let map = ResponseMap::new()
            .map("obj", ResponseSource::Data("opt_res.out.keff".into()))
            .map("r", ResponseSource::Parameter("radius".into()));
        let labels: Vec<String> = ["obj", "r", "power", "radius"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let values = map.extract(&labels, &results).unwrap();
        assert_eq!(
            values,
            vec![
                ("obj".to_string(), 1.02),
                ("r".to_string(), 2.0),
                ("power".to_string(), 3.0),
                ("radius".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn extract_reports_missing_and_non_numeric_responses() {
        let results = results_with(BTreeMap::new(), Parameters::new().with("name", "core"));
        let map = ResponseMap::new();

        assert!(matches!(
            map.extract(&["nope".to_string()], &results),
            Err(CouplingError::ResponseMissing { .. })
        ));
        assert!(matches!(
            map.extract(&["name".to_string()], &results),
            Err(CouplingError::ResponseNotNumeric { .. })
        ));
    }

    #[test]
    fn final_results_is_the_last_iteration() {
        let first = results_with(BTreeMap::new(), Parameters::new().with("i", 1));
        let second = results_with(BTreeMap::new(), Parameters::new().with("i", 2));
        let coupled = CoupledResults {
            iterations: vec![first, second.clone()],
        };
        assert_eq!(coupled.len(), 2);
        assert_eq!(coupled.final_results(), Some(&second));
        assert!(CoupledResults::default().final_results().is_none());
    }
}
