#![cfg(unix)]

use simweave::core::params::{Parameters, Value};
use simweave::core::template::Template;
use simweave::engine::config::{Environment, ExecutableSpec, PluginConfigBuilder};
use simweave::engine::plugin::{Plugin, TemplateRender};
use simweave::engine::postprocess::KeyValueFile;
use simweave::engine::workspace::WorkspaceOptions;
use simweave::workflows::coupled::{
    CoupledWorkflow, CouplingError, ResponseMap, ResponseSource, driver_step,
};
use simweave::workflows::handshake::{
    FileChannel, ParameterSet, RequestedResponse, Response, STOP_MARKER, done_marker,
    wait_framed, write_framed, Received,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const POLL: Duration = Duration::from_millis(10);
const WAIT: Option<Duration> = Some(Duration::from_secs(20));

/// Doubles `x` into `opt_res.out`; fails when `x` is negative.
fn doubling_plugin(root: &Path) -> Plugin {
    let script = r#"x=$(sed -n 's/^x = //p' "$1"); case "$x" in -*) echo "negative input" >&2; exit 2;; esac; echo "objective = $(awk "BEGIN { print 2 * $x }")" > opt_res.out"#;
    let config = PluginConfigBuilder::new()
        .name("doubler")
        .executable(ExecutableSpec::named("sh").with_explicit("/bin/sh"))
        .args(["-c", script, "sh", "{input}"])
        .workspace(WorkspaceOptions {
            root: Some(root.to_path_buf()),
            ..Default::default()
        })
        .build()
        .unwrap();
    let render = TemplateRender::new(Template::from_str_with_name("model.inp", "x = {{ x }}\n"));
    Plugin::new(config, &Environment::default(), render)
        .unwrap()
        .with_postprocessor(KeyValueFile::new("opt_res.out"))
}

fn responses() -> ResponseMap {
    ResponseMap::new().map("obj_fn", ResponseSource::Data("opt_res.out.objective".into()))
}

fn params_for(x: f64) -> String {
    ParameterSet {
        variables: vec![("x".to_string(), Value::Float(x))],
        responses: vec![RequestedResponse {
            label: "obj_fn".into(),
            asv: 1,
        }],
        eval_id: None,
    }
    .format()
}

/// Plays the outer tool: one exchange per value, then the stop marker.
fn outer_tool(dir: PathBuf, values: Vec<f64>) -> thread::JoinHandle<Vec<Response>> {
    thread::spawn(move || {
        let channel = FileChannel::new(&dir);
        let mut answers = Vec::new();
        for x in values {
            write_framed(&channel.params_path(), &params_for(x)).unwrap();
            match wait_framed(&channel.results_path(), None, POLL, WAIT).unwrap() {
                Received::Data(text) => answers.push(Response::parse(&text, "results.out").unwrap()),
                Received::Stopped => unreachable!(),
            }
            if matches!(answers.last(), Some(Response::Fail)) {
                return answers;
            }
        }
        std::fs::write(dir.join(STOP_MARKER), b"").unwrap();
        answers
    })
}

#[test]
fn n_iterations_yield_n_results_and_the_final_one_is_the_last() {
    let root = tempdir().unwrap();
    let exchange = tempdir().unwrap();
    let plugin = doubling_plugin(root.path());
    let tool = outer_tool(exchange.path().to_path_buf(), vec![1.0, 2.5, 4.0]);

    let channel = FileChannel::new(exchange.path())
        .poll_interval(POLL)
        .timeout(WAIT);
    let coupled = CoupledWorkflow::new(&plugin, channel)
        .responses(responses())
        .run()
        .unwrap();

    let answers = tool.join().unwrap();
    assert_eq!(coupled.len(), 3);
    assert_eq!(coupled.final_results(), coupled.iterations().get(2));
    let xs: Vec<_> = coupled
        .iterations()
        .iter()
        .map(|r| r.parameters.get("x").cloned())
        .collect();
    assert_eq!(
        xs,
        vec![
            Some(Value::Float(1.0)),
            Some(Value::Float(2.5)),
            Some(Value::Float(4.0))
        ]
    );
    assert_eq!(
        answers,
        vec![
            Response::Values(vec![("obj_fn".to_string(), 2.0)]),
            Response::Values(vec![("obj_fn".to_string(), 5.0)]),
            Response::Values(vec![("obj_fn".to_string(), 8.0)]),
        ]
    );
}

#[test]
fn nested_failure_stops_the_loop_and_keeps_completed_iterations() {
    let root = tempdir().unwrap();
    let exchange = tempdir().unwrap();
    let plugin = doubling_plugin(root.path());
    let tool = outer_tool(exchange.path().to_path_buf(), vec![1.0, -1.0, 3.0]);

    let channel = FileChannel::new(exchange.path())
        .poll_interval(POLL)
        .timeout(WAIT);
    let failure = CoupledWorkflow::new(&plugin, channel)
        .responses(responses())
        .run()
        .unwrap_err();

    let answers = tool.join().unwrap();
    assert_eq!(answers.last(), Some(&Response::Fail));
    assert_eq!(failure.completed.len(), 1);
    assert!(matches!(
        failure.error,
        CouplingError::IterationFailed { iteration: 2, .. }
    ));
}

#[test]
fn max_iterations_bounds_the_loop() {
    let root = tempdir().unwrap();
    let exchange = tempdir().unwrap();
    let plugin = doubling_plugin(root.path());
    let channel = FileChannel::new(exchange.path())
        .poll_interval(POLL)
        .timeout(WAIT);
    write_framed(&channel.params_path(), &params_for(3.0)).unwrap();

    let coupled = CoupledWorkflow::new(&plugin, channel.clone())
        .responses(responses())
        .base_parameters(Parameters::new().with("unused", 1))
        .max_iterations(1)
        .run()
        .unwrap();

    assert_eq!(coupled.len(), 1);
    assert!(done_marker(&channel.results_path()).exists());
    assert_eq!(
        coupled.final_results().unwrap().parameters.get("unused"),
        Some(&Value::Int(1))
    );
}

#[test]
fn driver_step_answers_one_evaluation() {
    let root = tempdir().unwrap();
    let exchange = tempdir().unwrap();
    let plugin = doubling_plugin(root.path());
    let params = exchange.path().join("params.in");
    let response = exchange.path().join("results.out");

    std::fs::write(&params, params_for(1.5)).unwrap();
    let results = driver_step(&plugin, &params, &response, &responses(), &Parameters::new()).unwrap();
    assert_eq!(results.parameters.get("x"), Some(&Value::Float(1.5)));
    assert_eq!(
        std::fs::read_to_string(&response).unwrap(),
        "3.000000000000000e+00 obj_fn\n"
    );

    std::fs::write(&params, params_for(-2.0)).unwrap();
    let err = driver_step(&plugin, &params, &response, &responses(), &Parameters::new()).unwrap_err();
    assert!(matches!(err, CouplingError::IterationFailed { .. }));
    assert_eq!(std::fs::read_to_string(&response).unwrap(), "FAIL\n");
}
