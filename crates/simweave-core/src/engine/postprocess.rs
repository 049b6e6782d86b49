//! Ready-made postprocessors shared by the per-code plugin variants.

use super::collector::{Postprocess, PostprocessContext, PostprocessError, list_artifacts};
use super::process::{self, ExecutionRequest};
use crate::core::params::Value;
use crate::core::results::read_csv_table;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Parses every `*.csv` output into `csv -> {file -> {column -> values}}`.
#[derive(Debug, Clone, Default)]
pub struct CsvTables;

impl CsvTables {
    fn tables(
        ctx: &PostprocessContext<'_>,
        files: &[String],
    ) -> Result<BTreeMap<String, Value>, PostprocessError> {
        let mut tables = BTreeMap::new();
        for file in files.iter().filter(|f| has_extension(f, "csv")) {
            let table = read_csv_table(&ctx.path_of(file))?;
            tables.insert(file.clone(), Value::Table(table));
        }
        let mut data = BTreeMap::new();
        data.insert("csv".to_string(), Value::Table(tables));
        Ok(data)
    }
}

impl Postprocess for CsvTables {
    fn name(&self) -> &str {
        "csv"
    }

    fn postprocess(
        &self,
        ctx: &PostprocessContext<'_>,
    ) -> Result<BTreeMap<String, Value>, PostprocessError> {
        Self::tables(ctx, ctx.outputs)
    }
}

/// Reads `label = value` lines from one output file into `{file -> {label -> value}}`.
#[derive(Debug, Clone)]
pub struct KeyValueFile {
    file_name: String,
}

impl KeyValueFile {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

impl Postprocess for KeyValueFile {
    fn name(&self) -> &str {
        "key-value"
    }

    fn postprocess(
        &self,
        ctx: &PostprocessContext<'_>,
    ) -> Result<BTreeMap<String, Value>, PostprocessError> {
        if !ctx.outputs.contains(&self.file_name) {
            return Err(PostprocessError::MissingOutput(self.file_name.clone()));
        }
        let path = ctx.path_of(&self.file_name);
        let content = std::fs::read_to_string(&path).map_err(|e| PostprocessError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut entries = BTreeMap::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| PostprocessError::Parse {
                file: self.file_name.clone(),
                reason: format!("line {} is not of the form 'label = value'", n + 1),
            })?;
            entries.insert(key.trim().to_string(), Value::parse_scalar(value));
        }

        let mut data = BTreeMap::new();
        data.insert(self.file_name.clone(), Value::Table(entries));
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Ascii,
    Binary,
}

impl OutputFormat {
    /// Reads the value of `directive` from an input file. The directive may be
    /// written `directive = value` or `directive value`, in any case. A
    /// missing directive means the code's default, ASCII.
    pub fn detect(input: &str, directive: &str) -> Self {
        for line in input.lines() {
            let line = line.trim();
            let Some(head) = line.get(..directive.len()) else {
                continue;
            };
            if !head.eq_ignore_ascii_case(directive) {
                continue;
            }
            let rest = &line[directive.len()..];
            if !rest.starts_with([' ', '\t', '=']) {
                continue;
            }
            let value = rest.trim_start_matches([' ', '\t', '=']).split_whitespace().next();
            return match value {
                Some(v) if v.eq_ignore_ascii_case("binary") || v.eq_ignore_ascii_case("bin") => {
                    OutputFormat::Binary
                }
                _ => OutputFormat::Ascii,
            };
        }
        OutputFormat::Ascii
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Ascii => "ascii",
            OutputFormat::Binary => "binary",
        }
    }
}

/// Runs an external converter over binary outputs, but only when the primary
/// input selected binary output, then parses the resulting CSV files.
#[derive(Debug, Clone)]
pub struct GatedConversion {
    directive: String,
    converter: PathBuf,
    converter_args: Vec<String>,
    binary_extension: String,
}

impl GatedConversion {
    /// `converter_args` may reference the file being converted as `{file}`.
    pub fn new(
        directive: impl Into<String>,
        converter: impl Into<PathBuf>,
        binary_extension: impl Into<String>,
    ) -> Self {
        Self {
            directive: directive.into(),
            converter: converter.into(),
            converter_args: vec!["{file}".to_string()],
            binary_extension: binary_extension.into(),
        }
    }

    pub fn with_converter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.converter_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn convert(&self, ctx: &PostprocessContext<'_>) -> Result<(), PostprocessError> {
        for file in ctx
            .outputs
            .iter()
            .filter(|f| has_extension(f, &self.binary_extension))
        {
            let args: Vec<String> = self
                .converter_args
                .iter()
                .map(|a| a.replace("{file}", file))
                .collect();
            let request = ExecutionRequest::new(&self.converter, ctx.workspace).args(args);
            let result =
                process::run(&request).map_err(|e| PostprocessError::Converter(e.to_string()))?;
            if !result.success() {
                return Err(PostprocessError::Converter(format!(
                    "converting '{}' exited with {:?}: {}",
                    file,
                    result.exit_code,
                    result.stderr_text().trim()
                )));
            }
        }
        Ok(())
    }
}

impl Postprocess for GatedConversion {
    fn name(&self) -> &str {
        "gated-conversion"
    }

    fn postprocess(
        &self,
        ctx: &PostprocessContext<'_>,
    ) -> Result<BTreeMap<String, Value>, PostprocessError> {
        let primary = ctx
            .primary_input()
            .ok_or_else(|| PostprocessError::MissingOutput("primary input".into()))?;
        let path = ctx.path_of(primary);
        let input = std::fs::read_to_string(&path).map_err(|e| PostprocessError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

        let format = OutputFormat::detect(&input, &self.directive);
        let files = match format {
            OutputFormat::Ascii => ctx.outputs.to_vec(),
            OutputFormat::Binary => {
                info!(converter = %self.converter.display(), "Converting binary outputs.");
                self.convert(ctx)?;
                list_artifacts(ctx.workspace)
                    .map_err(|e| PostprocessError::Converter(e.to_string()))?
                    .into_iter()
                    .filter(|f| !ctx.inputs.contains(f))
                    .collect()
            }
        };

        let mut data = CsvTables::tables(ctx, &files)?;
        data.insert("output_format".to_string(), Value::from(format.as_str()));
        Ok(data)
    }
}

fn has_extension(file: &str, extension: &str) -> bool {
    file.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::params::Parameters;
    use tempfile::tempdir;

    #[test]
    fn detect_reads_directive_in_either_form() {
        assert_eq!(OutputFormat::detect("plot_format = binary\n", "plot_format"), OutputFormat::Binary);
        assert_eq!(OutputFormat::detect("PLOT_FORMAT BIN", "plot_format"), OutputFormat::Binary);
        assert_eq!(OutputFormat::detect("plot_format=ascii", "plot_format"), OutputFormat::Ascii);
        assert_eq!(OutputFormat::detect("plot_formatx binary", "plot_format"), OutputFormat::Ascii);
        assert_eq!(OutputFormat::detect("nothing here", "plot_format"), OutputFormat::Ascii);
    }

    #[test]
    fn csv_tables_nests_by_file_then_column() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("power.csv"), "t,p\n0,1.5\n1,2.5\n").unwrap();
        std::fs::write(dir.path().join("log.txt"), "ignored").unwrap();
        let outputs = vec!["log.txt".to_string(), "power.csv".to_string()];
        let params = Parameters::new();
        let ctx = PostprocessContext {
            workspace: dir.path(),
            inputs: &[],
            outputs: &outputs,
            parameters: &params,
        };

        let data = CsvTables.postprocess(&ctx).unwrap();
        let csv = data["csv"].as_table().unwrap();
        assert_eq!(csv.len(), 1);
        let power = csv["power.csv"].as_table().unwrap();
        assert_eq!(
            power["p"],
            Value::Array(vec![Value::Float(1.5), Value::Float(2.5)])
        );
    }

    #[test]
    fn key_value_file_parses_labels() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("opt_res.out"), "# header\nkeff = 1.0125\nmass=350\n").unwrap();
        let outputs = vec!["opt_res.out".to_string()];
        let params = Parameters::new();
        let ctx = PostprocessContext {
            workspace: dir.path(),
            inputs: &[],
            outputs: &outputs,
            parameters: &params,
        };

        let data = KeyValueFile::new("opt_res.out").postprocess(&ctx).unwrap();
        let table = data["opt_res.out"].as_table().unwrap();
        assert_eq!(table["keff"], Value::Float(1.0125));
        assert_eq!(table["mass"], Value::Int(350));

        let missing = KeyValueFile::new("other.out").postprocess(&ctx);
        assert!(matches!(missing, Err(PostprocessError::MissingOutput(_))));
    }

    #[cfg(unix)]
    #[test]
    fn gated_conversion_only_runs_converter_for_binary_output() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("data.bin"), "raw").unwrap();
        let inputs = vec!["deck.inp".to_string()];
        let outputs = vec!["data.bin".to_string()];
        let params = Parameters::new();
        let conversion = GatedConversion::new("plot_format", "/bin/sh", "bin")
            .with_converter_args(["-c", "printf 'x\\n7\\n' > \"$0.csv\"", "{file}"]);

        std::fs::write(dir.path().join("deck.inp"), "plot_format = ascii\n").unwrap();
        let ctx = PostprocessContext {
            workspace: dir.path(),
            inputs: &inputs,
            outputs: &outputs,
            parameters: &params,
        };
        let ascii = conversion.postprocess(&ctx).unwrap();
        assert_eq!(ascii["output_format"], Value::from("ascii"));
        assert!(!dir.path().join("data.bin.csv").exists());

        std::fs::write(dir.path().join("deck.inp"), "plot_format = binary\n").unwrap();
        let binary = conversion.postprocess(&ctx).unwrap();
        assert_eq!(binary["output_format"], Value::from("binary"));
        let csv = binary["csv"].as_table().unwrap();
        assert!(csv.contains_key("data.bin.csv"));
    }
}
