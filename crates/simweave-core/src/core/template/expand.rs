use crate::core::nuclide::{NuclideIndex, atomic_number, natural_isotopes};
use crate::core::utils::format_scientific;
use thiserror::Error;

/// Smallest indentation MCNP accepts for a continuation line.
const CONTINUATION_INDENT: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpansionError {
    #[error("Unrecognized element symbol '{0}'")]
    UnknownElement(String),
    #[error("No cross-section suffix given for '{0}' and no default suffix set")]
    MissingSuffix(String),
    #[error("Nuclide '{zaid}' is not available in the nuclide index")]
    MissingNuclide { zaid: String },
    #[error("Invalid fraction '{token}'")]
    InvalidFraction { token: String },
    #[error("Nuclide '{token}' is not followed by a fraction")]
    MissingFraction { token: String },
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    start: usize,
    text: &'a str,
}

/// What a single `(nuclide, fraction)` pair turns into.
enum Emitted<'a> {
    Unchanged { nuclide: &'a str, fraction: &'a str },
    Natural { zaid: String, fraction: &'a str },
    Isotopes(Vec<(String, f64)>),
}

/// Replaces natural-element entries of material cards with one entry per
/// naturally occurring isotope.
///
/// Entries are recognized on `m<N>` cards and their whitespace-led
/// continuation lines. Weight fractions (negative) are split by
/// `abundance * mass`, atom fractions (positive) by abundance alone, so the
/// emitted fractions always sum to the original one. Lines without natural
/// entries are returned untouched.
pub fn expand_element(
    block: &str,
    default_suffix: Option<&str>,
    index: &NuclideIndex,
) -> Result<String, ExpansionError> {
    let mut out = Vec::new();
    let mut in_material = false;

    for line in block.split('\n') {
        let tokens = tokenize(line);
        let Some(first) = tokens.first() else {
            in_material = false;
            out.push(line.to_string());
            continue;
        };

        let pairs_from = if first.start > 0 {
            in_material.then_some(0)
        } else if first.text.eq_ignore_ascii_case("c") {
            None
        } else if is_material_card(first.text) {
            in_material = true;
            Some(1)
        } else {
            in_material = false;
            None
        };

        match pairs_from {
            Some(from) => out.extend(expand_line(line, &tokens, from, default_suffix, index)?),
            None => out.push(line.to_string()),
        }
    }

    Ok(out.join("\n"))
}

fn is_material_card(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some('m' | 'M'))
        && token.len() > 1
        && chars.all(|c| c.is_ascii_digit())
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokens.push(Token {
                    start: s,
                    text: &line[s..i],
                });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            text: &line[s..],
        });
    }
    tokens
}

fn expand_line(
    line: &str,
    tokens: &[Token<'_>],
    from: usize,
    default_suffix: Option<&str>,
    index: &NuclideIndex,
) -> Result<Vec<String>, ExpansionError> {
    let mut emitted = Vec::new();
    let mut i = from;
    let mut any_natural = false;
    while i < tokens.len() {
        let nuclide = tokens[i];
        if nuclide.text.contains('=') || nuclide.text.starts_with('$') {
            break;
        }
        let fraction = tokens.get(i + 1).copied();

        let pair = match natural_element(nuclide.text)? {
            Some((z, suffix)) => {
                let fraction = fraction.ok_or_else(|| ExpansionError::MissingFraction {
                    token: nuclide.text.to_string(),
                })?;
                let value = fraction.text.parse::<f64>().map_err(|_| {
                    ExpansionError::InvalidFraction {
                        token: fraction.text.to_string(),
                    }
                })?;
                let suffix = suffix.or(default_suffix).ok_or_else(|| {
                    ExpansionError::MissingSuffix(nuclide.text.to_string())
                })?;
                any_natural = true;
                expand_pair(z, suffix, value, fraction.text, index)?
            }
            None => match fraction {
                Some(fraction) => Emitted::Unchanged {
                    nuclide: nuclide.text,
                    fraction: fraction.text,
                },
                // An odd trailing token is not ours to judge.
                None => break,
            },
        };
        emitted.push((nuclide, fraction, pair));
        i += 2;
    }

    if !any_natural {
        return Ok(vec![line.to_string()]);
    }

    let trailing = tokens.get(i).map(|t| &line[t.start..]);
    let Some((first_nuclide, first_fraction, _)) = emitted.first() else {
        return Ok(vec![line.to_string()]);
    };
    let prefix = &line[..first_nuclide.start];
    let indent = " ".repeat(first_nuclide.start.max(CONTINUATION_INDENT));
    let column = first_fraction
        .map(|f| f.start - first_nuclide.start)
        .unwrap_or(0);

    let mut lines = Vec::new();
    for (_, _, pair) in &emitted {
        match pair {
            Emitted::Unchanged { nuclide, fraction } => {
                lines.push(format_entry(nuclide, fraction, column));
            }
            Emitted::Natural { zaid, fraction } => {
                lines.push(format_entry(zaid, fraction, column));
            }
            Emitted::Isotopes(isotopes) => {
                for (zaid, value) in isotopes {
                    lines.push(format_entry(zaid, &format_scientific(*value, 8), column));
                }
            }
        }
    }

    let mut out: Vec<String> = lines
        .into_iter()
        .enumerate()
        .map(|(n, entry)| {
            if n == 0 {
                format!("{}{}", prefix, entry)
            } else {
                format!("{}{}", indent, entry)
            }
        })
        .collect();
    if let (Some(rest), Some(last)) = (trailing, out.last_mut()) {
        last.push_str("  ");
        last.push_str(rest);
    }
    Ok(out)
}

/// Parses `Fe`, `fe.70c`, `26000` or `26000.70c` into `(Z, suffix)`. Returns
/// `None` for tokens that name a specific isotope.
fn natural_element(token: &str) -> Result<Option<(u32, Option<&str>)>, ExpansionError> {
    let (base, suffix) = match token.split_once('.') {
        Some((base, suffix)) => (base, Some(suffix).filter(|s| !s.is_empty())),
        None => (token, None),
    };

    if !base.is_empty() && base.chars().all(|c| c.is_ascii_alphabetic()) {
        return atomic_number(base)
            .map(|z| Some((z, suffix)))
            .ok_or_else(|| ExpansionError::UnknownElement(token.to_string()));
    }

    match base.parse::<u32>() {
        Ok(za) if za >= 1000 && za % 1000 == 0 => Ok(Some((za / 1000, suffix))),
        _ => Ok(None),
    }
}

fn expand_pair<'a>(
    z: u32,
    suffix: &str,
    fraction: f64,
    fraction_text: &'a str,
    index: &NuclideIndex,
) -> Result<Emitted<'a>, ExpansionError> {
    let isotopes = natural_isotopes(z);
    let missing = isotopes.iter().find(|iso| !index.contains(iso.za(), suffix));

    if isotopes.is_empty() || missing.is_some() {
        let natural = z * 1000;
        if index.contains(natural, suffix) {
            return Ok(Emitted::Natural {
                zaid: format!("{}.{}", natural, suffix),
                fraction: fraction_text,
            });
        }
        let zaid = missing.map(|iso| iso.za()).unwrap_or(natural);
        return Err(ExpansionError::MissingNuclide {
            zaid: format!("{}.{}", zaid, suffix),
        });
    }

    let weights: Vec<f64> = if fraction < 0.0 {
        isotopes.iter().map(|iso| iso.abundance * iso.mass).collect()
    } else {
        isotopes.iter().map(|iso| iso.abundance).collect()
    };
    let total: f64 = weights.iter().sum();

    Ok(Emitted::Isotopes(
        isotopes
            .iter()
            .zip(&weights)
            .map(|(iso, w)| (format!("{}.{}", iso.za(), suffix), fraction * w / total))
            .collect(),
    ))
}

fn format_entry(nuclide: &str, fraction: &str, column: usize) -> String {
    let width = column.max(nuclide.len() + 1);
    format!("{:<width$}{}", nuclide, fraction)
}
