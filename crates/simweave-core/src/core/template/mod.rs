//! Template rendering for simulation input files.
//!
//! Templates use Jinja syntax: `{{ name }}` substitutes a parameter and
//! `{% filter name(args) %} ... {% endfilter %}` applies a text filter to a
//! block. Substitution is total: a template that references a name missing
//! from the [`Parameters`] fails before any output is produced.

pub mod expand;

use crate::core::nuclide::NuclideIndex;
use crate::core::params::Parameters;
use minijinja::value::Rest;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use expand::{ExpansionError, expand_element};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Syntax error in template '{template}': {message}")]
    Syntax { template: String, message: String },
    #[error("Template '{template}' references undefined parameter '{name}'")]
    MissingVariable { template: String, name: String },
    #[error("Element expansion failed in template '{template}': {source}")]
    Expansion {
        template: String,
        source: ExpansionError,
    },
    #[error("Failed to render template '{template}': {message}")]
    Render { template: String, message: String },
}

/// Immutable template source together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    path: Option<PathBuf>,
    source: Arc<str>,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path).map_err(|e| TemplateError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Ok(Self {
            name,
            path: Some(path.to_path_buf()),
            source: source.into(),
        })
    }

    pub fn from_str_with_name(name: impl Into<String>, source: &str) -> Self {
        Self {
            name: name.into(),
            path: None,
            source: source.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A concrete input file produced by rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedInput {
    pub file_name: String,
    pub contents: String,
}

impl RenderedInput {
    pub fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

/// A user-supplied block filter: receives the rendered block text and the
/// filter's string arguments.
pub type FilterFn = Arc<dyn Fn(&str, &[String]) -> Result<String, String> + Send + Sync>;

/// The set of text filters available to a template.
#[derive(Clone, Default)]
pub struct Filters {
    nuclides: Option<Arc<NuclideIndex>>,
    custom: BTreeMap<String, FilterFn>,
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filters")
            .field("expand_element", &self.nuclides.is_some())
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `expand_element(default_suffix)` backed by the given index.
    pub fn with_expand_element(mut self, index: Arc<NuclideIndex>) -> Self {
        self.nuclides = Some(index);
        self
    }

    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<String, String> + Send + Sync + 'static,
    {
        self.custom.insert(name.into(), Arc::new(filter));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        if self.nuclides.is_some() {
            names.push("expand_element");
        }
        names.sort_unstable();
        names
    }

    fn install(&self, env: &mut Environment<'_>) {
        if let Some(index) = &self.nuclides {
            let index = Arc::clone(index);
            env.add_filter(
                "expand_element",
                move |block: String, suffix: Option<String>| -> Result<String, minijinja::Error> {
                    expand_element(&block, suffix.as_deref(), &index).map_err(|e| {
                        minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string())
                            .with_source(e)
                    })
                },
            );
        }
        for (name, filter) in &self.custom {
            let filter = Arc::clone(filter);
            env.add_filter(
                name.clone(),
                move |block: String, args: Rest<String>| -> Result<String, minijinja::Error> {
                    filter(&block, &args)
                        .map_err(|msg| minijinja::Error::new(ErrorKind::InvalidOperation, msg))
                },
            );
        }
    }
}

/// Renders `template` against `params`, applying any registered `filters`.
pub fn render(
    template: &Template,
    params: &Parameters,
    filters: &Filters,
) -> Result<String, TemplateError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    filters.install(&mut env);

    let syntax = |e: minijinja::Error| TemplateError::Syntax {
        template: template.name.clone(),
        message: e.to_string(),
    };
    env.add_template(template.name(), template.source())
        .map_err(syntax)?;
    let compiled = env.get_template(template.name()).map_err(syntax)?;

    let mut undeclared: Vec<String> = compiled
        .undeclared_variables(false)
        .into_iter()
        .filter(|name| !params.contains(name))
        .collect();
    undeclared.sort();
    if let Some(name) = undeclared.into_iter().next() {
        return Err(TemplateError::MissingVariable {
            template: template.name.clone(),
            name,
        });
    }

    let rendered = compiled
        .render(params)
        .map_err(|e| classify_render_error(&template.name, e))?;
    debug!(
        template = %template.name,
        bytes = rendered.len(),
        "Rendered template."
    );
    Ok(rendered)
}

fn classify_render_error(template: &str, err: minijinja::Error) -> TemplateError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(&err);
    while let Some(cause) = source {
        if let Some(expansion) = cause.downcast_ref::<ExpansionError>() {
            return TemplateError::Expansion {
                template: template.to_string(),
                source: expansion.clone(),
            };
        }
        source = cause.source();
    }
    match err.kind() {
        ErrorKind::SyntaxError | ErrorKind::UnknownFilter => TemplateError::Syntax {
            template: template.to_string(),
            message: err.to_string(),
        },
        _ => TemplateError::Render {
            template: template.to_string(),
            message: err.to_string(),
        },
    }
}

/// Renders templates with a fixed set of filters.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    filters: Filters,
}

impl TemplateRenderer {
    pub fn new(filters: Filters) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn render(&self, template: &Template, params: &Parameters) -> Result<String, TemplateError> {
        render(template, params, &self.filters)
    }

    /// Renders `template` into an input file called `file_name`.
    pub fn render_input(
        &self,
        template: &Template,
        params: &Parameters,
        file_name: impl Into<String>,
    ) -> Result<RenderedInput, TemplateError> {
        Ok(RenderedInput::new(file_name, self.render(template, params)?))
    }

    /// Loads the template at `path` and renders it into an input file of the
    /// same name.
    pub fn render_file(&self, path: &Path, params: &Parameters) -> Result<RenderedInput, TemplateError> {
        let template = Template::load(path)?;
        let file_name = template.name.clone();
        self.render_input(&template, params, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fe_index() -> Arc<NuclideIndex> {
        Arc::new(
            NuclideIndex::parse(
                "directory\n 26054.70c 53.47 lib\n 26056.70c 55.45 lib\n 26057.70c 56.44 lib\n 26058.70c 57.43 lib\n",
            )
            .unwrap(),
        )
    }

    #[test]
    fn render_substitutes_variables() {
        let template = Template::from_str_with_name("t", "value = {{ x }}");
        let params = Parameters::new().with("x", 5);
        assert_eq!(render(&template, &params, &Filters::new()).unwrap(), "value = 5");
    }

    #[test]
    fn render_leaves_no_placeholder_markers() {
        let template = Template::from_str_with_name(
            "t",
            "r = {{ radius }}\nname = {{ name }}\n{% for a in angles %}{{ a }} {% endfor %}\n",
        );
        let params = Parameters::new()
            .with("radius", 4.5)
            .with("name", "core")
            .with("angles", vec![0, 90]);
        let out = render(&template, &params, &Filters::new()).unwrap();
        assert_eq!(out, "r = 4.5\nname = core\n0 90 \n");
        assert!(!out.contains("{{") && !out.contains("{%"));
    }

    #[test]
    fn missing_variable_is_named() {
        let template = Template::from_str_with_name("deck", "{{ a }} {{ b }} {{ c }}");
        let params = Parameters::new().with("b", 1);
        match render(&template, &params, &Filters::new()) {
            Err(TemplateError::MissingVariable { template, name }) => {
                assert_eq!(template, "deck");
                assert_eq!(name, "a");
            }
            other => panic!("expected missing variable, got {:?}", other),
        }
    }

    #[test]
    fn syntax_errors_and_unknown_filters_are_reported() {
        let params = Parameters::new().with("x", 1);
        let broken = Template::from_str_with_name("t", "{{ x ");
        assert!(matches!(
            render(&broken, &params, &Filters::new()),
            Err(TemplateError::Syntax { .. })
        ));

        let unknown = Template::from_str_with_name("t", "{% filter nope %}{{ x }}{% endfilter %}");
        assert!(matches!(
            render(&unknown, &params, &Filters::new()),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn expand_element_filter_expands_blocks() {
        let template = Template::from_str_with_name(
            "mcnp",
            "{% filter expand_element('70c') %}\nm1 Fe  {{ frac }}\n{% endfilter %}",
        );
        let params = Parameters::new().with("frac", -0.79);
        let filters = Filters::new().with_expand_element(fe_index());
        let out = render(&template, &params, &filters).unwrap();

        let values: Vec<f64> = out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split_whitespace().last().unwrap().parse().unwrap())
            .collect();
        assert_eq!(values.len(), 4);
        assert!((values.iter().sum::<f64>() + 0.79).abs() < 1e-6);
    }

    #[test]
    fn expansion_errors_surface_as_expansion_variant() {
        let template = Template::from_str_with_name(
            "mcnp",
            "{% filter expand_element() %}m1 Fe -1.0{% endfilter %}",
        );
        let filters = Filters::new().with_expand_element(fe_index());
        match render(&template, &Parameters::new(), &filters) {
            Err(TemplateError::Expansion { source, .. }) => {
                assert_eq!(source, ExpansionError::MissingSuffix("Fe".into()));
            }
            other => panic!("expected expansion error, got {:?}", other),
        }
    }

    #[test]
    fn custom_filters_receive_arguments() {
        let template = Template::from_str_with_name(
            "t",
            "{% filter wrap('<', '>') %}{{ x }}{% endfilter %}",
        );
        let filters = Filters::new().with_filter("wrap", |block, args| {
            Ok(format!("{}{}{}", args[0], block, args[1]))
        });
        let params = Parameters::new().with("x", "body");
        assert_eq!(render(&template, &params, &filters).unwrap(), "<body>");
        assert_eq!(filters.names(), vec!["wrap"]);
    }

    #[test]
    fn render_file_names_output_after_template() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "n = {{ n }}\n").unwrap();

        let renderer = TemplateRenderer::default();
        let rendered = renderer
            .render_file(&path, &Parameters::new().with("n", 3))
            .unwrap();
        assert_eq!(rendered.file_name, "input.txt");
        assert_eq!(rendered.contents, "n = 3\n");
    }
}
