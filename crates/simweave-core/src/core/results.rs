use crate::core::params::{Parameters, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name used when a [`Results`] snapshot is persisted next to its artifacts.
pub const RESULTS_FILE_NAME: &str = "results.toml";

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
}

/// Bookkeeping about the invocation that produced a [`Results`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecInfo {
    pub job_id: String,
    pub plugin_name: String,
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    pub exit_code: Option<i32>,
}

/// The structured record of one completed invocation.
///
/// `inputs` and `outputs` are paths relative to `location`. `data` holds
/// whatever the plugin's postprocessing step extracted, for example
/// `csv -> {file -> {column -> [values]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    pub location: PathBuf,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postprocess_error: Option<String>,
    pub exec_info: ExecInfo,
    pub parameters: Parameters,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl Results {
    pub fn job_id(&self) -> &str {
        &self.exec_info.job_id
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|o| self.location.join(o)).collect()
    }

    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.inputs.iter().map(|i| self.location.join(i)).collect()
    }

    pub fn has_postprocess_error(&self) -> bool {
        self.postprocess_error.is_some()
    }

    /// Looks up a nested data entry by dotted path, e.g. `csv.out.csv.keff`
    /// is tried as `csv` → `out.csv` → `keff` by greedy key matching.
    pub fn data_at(&self, path: &str) -> Option<&Value> {
        lookup_dotted(&self.data, path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ResultsError> {
        let content = toml::to_string(self)?;
        std::fs::write(path, content).map_err(|e| ResultsError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ResultsError> {
        let content = std::fs::read_to_string(path).map_err(|e| ResultsError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ResultsError::Toml {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }
}

fn lookup_dotted<'a>(table: &'a BTreeMap<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = table.get(path) {
        return Some(value);
    }
    // Keys may themselves contain dots (file names), so try every split point.
    path.match_indices('.').find_map(|(i, _)| {
        let (head, tail) = (&path[..i], &path[i + 1..]);
        table
            .get(head)
            .and_then(Value::as_table)
            .and_then(|inner| lookup_dotted(inner, tail))
    })
}

/// Reads a headed CSV file into `column -> [values]`. Cells that parse as
/// numbers become floats, everything else stays text.
pub fn read_csv_table(path: &Path) -> Result<BTreeMap<String, Value>, ResultsError> {
    let csv_err = |e: csv::Error| ResultsError::Csv {
        path: path.to_string_lossy().to_string(),
        source: e,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];

    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        for (column, cell) in columns.iter_mut().zip(record.iter()) {
            column.push(match cell.parse::<f64>() {
                Ok(x) => Value::Float(x),
                Err(_) => Value::String(cell.to_string()),
            });
        }
    }

    Ok(headers
        .into_iter()
        .zip(columns)
        .map(|(h, c)| (h, Value::Array(c)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(location: &Path) -> Results {
        let mut csv = BTreeMap::new();
        let mut columns = BTreeMap::new();
        columns.insert(
            "keff".to_string(),
            Value::Array(vec![Value::Float(1.01), Value::Float(0.99)]),
        );
        csv.insert("out.csv".to_string(), Value::Table(columns));
        let mut data = BTreeMap::new();
        data.insert("csv".to_string(), Value::Table(csv));

        Results {
            location: location.to_path_buf(),
            inputs: vec!["input.txt".into()],
            outputs: vec!["out.csv".into(), "sub/log.txt".into()],
            postprocess_error: None,
            exec_info: ExecInfo {
                job_id: "job-1".into(),
                plugin_name: "generic".into(),
                timestamp: Utc::now(),
                duration_secs: 1.25,
                exit_code: Some(0),
            },
            parameters: Parameters::new().with("x", 5).with("name", "core"),
            data,
        }
    }

    #[test]
    fn save_and_load_reproduce_results() {
        let dir = tempdir().unwrap();
        let results = sample(dir.path());
        let path = dir.path().join(RESULTS_FILE_NAME);

        results.save(&path).unwrap();
        let loaded = Results::load(&path).unwrap();
        assert_eq!(loaded, results);
    }

    #[test]
    fn paths_are_resolved_against_location() {
        let results = sample(Path::new("/runs/job-1"));
        assert_eq!(
            results.output_paths(),
            vec![
                PathBuf::from("/runs/job-1/out.csv"),
                PathBuf::from("/runs/job-1/sub/log.txt")
            ]
        );
        assert_eq!(results.input_paths(), vec![PathBuf::from("/runs/job-1/input.txt")]);
    }

    #[test]
    fn data_at_handles_keys_containing_dots() {
        let results = sample(Path::new("/tmp"));
        let keff = results.data_at("csv.out.csv.keff").unwrap();
        assert_eq!(keff.as_array().unwrap().len(), 2);
        assert!(results.data_at("csv.missing.keff").is_none());
    }

    #[test]
    fn read_csv_table_groups_values_by_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "time, power, label\n0.0, 10.5, a\n1.0, 11.0, b\n").unwrap();

        let table = read_csv_table(&path).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table["power"],
            Value::Array(vec![Value::Float(10.5), Value::Float(11.0)])
        );
        assert_eq!(
            table["label"],
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let result = Results::load(Path::new("/no/such/results.toml"));
        assert!(matches!(result, Err(ResultsError::Io { .. })));
    }
}
