use simweave::core::params::{Parameters, Value};
use simweave::workflows::coupled::ResponseSource;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid assignment '{0}'. Expected KEY=VALUE.")]
    MissingSeparator(String),

    #[error("Key cannot be empty in assignment '{0}'.")]
    EmptyKey(String),

    #[error("Invalid response mapping '{0}'. Expected 'data:<path>' or 'param:<name>'.")]
    InvalidResponseSource(String),
}

/// Splits a `KEY=VALUE` assignment at the first `=`, trimming both sides.
pub fn parse_assignment(raw: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| ParseError::MissingSeparator(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyKey(raw.to_string()));
    }
    Ok((key, value.trim()))
}

/// Folds `NAME=VALUE` assignments into parameters, typing each value with
/// [`Value::parse_scalar`].
pub fn parse_param_overrides(values: &[String]) -> Result<Parameters, ParseError> {
    values
        .iter()
        .map(|raw| {
            let (key, value) = parse_assignment(raw)?;
            Ok((key.to_string(), Value::parse_scalar(value)))
        })
        .collect()
}

/// Parses a response mapping written as `data:<dotted.path>` or `param:<name>`.
pub fn parse_response_source(raw: &str) -> Result<ResponseSource, ParseError> {
    let invalid = || ParseError::InvalidResponseSource(raw.to_string());
    let (kind, target) = raw.split_once(':').ok_or_else(invalid)?;
    let target = target.trim();
    if target.is_empty() {
        return Err(invalid());
    }
    match kind.trim() {
        "data" => Ok(ResponseSource::Data(target.to_string())),
        "param" => Ok(ResponseSource::Parameter(target.to_string())),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_split_at_first_equals() {
        assert_eq!(parse_assignment("a=b=c"), Ok(("a", "b=c")));
        assert_eq!(parse_assignment(" radius = 1.5 "), Ok(("radius", "1.5")));
        assert_eq!(
            parse_assignment("novalue"),
            Err(ParseError::MissingSeparator("novalue".into()))
        );
        assert_eq!(parse_assignment("=5"), Err(ParseError::EmptyKey("=5".into())));
    }

    #[test]
    fn param_overrides_are_typed() {
        let params =
            parse_param_overrides(&["n=3".into(), "x=0.5".into(), "name=core".into()]).unwrap();
        assert_eq!(params.get("n"), Some(&Value::Int(3)));
        assert_eq!(params.get("x"), Some(&Value::Float(0.5)));
        assert_eq!(params.get("name"), Some(&Value::String("core".into())));
    }

    #[test]
    fn response_sources_name_their_origin() {
        assert_eq!(
            parse_response_source("data:opt_res.out.keff"),
            Ok(ResponseSource::Data("opt_res.out.keff".into()))
        );
        assert_eq!(
            parse_response_source("param:radius"),
            Ok(ResponseSource::Parameter("radius".into()))
        );
        assert!(parse_response_source("file:x").is_err());
        assert!(parse_response_source("data:").is_err());
        assert!(parse_response_source("keff").is_err());
    }
}
